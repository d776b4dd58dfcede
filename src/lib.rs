//! Lona compiler core
//!
//! Semantic analysis and IR generation for Lona, a small statically-typed
//! struct-and-function language.

pub mod utils;
pub mod frontend;
pub mod types;
pub mod sema;
pub mod middle;
pub mod codegen;

pub use codegen::{compile, compile_source, CompiledModule};
pub use utils::{Error, Result, Span};
