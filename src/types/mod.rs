//! Types module - registry, operation tables and the object model

pub mod type_system;
pub mod ops;
pub mod object;

pub use object::{Object, ObjectFlags};
pub use type_system::{TypeId, TypeKind, TypeRegistry};
