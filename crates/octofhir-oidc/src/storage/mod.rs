//! Storage used by the token engine.
//!
//! The engine persists nothing but single-use authorization codes.

pub mod code;

pub use code::{CodeStore, InMemoryCodeStore, generate_code_key};
