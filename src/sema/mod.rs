//! Semantic analysis - scopes, CFG checking and signature scanning

pub mod scope;
pub mod cfg;
pub mod type_scanner;

pub use cfg::CfgChecker;
pub use scope::ScopeTree;
pub use type_scanner::{FunctionSig, TypeScanner};
