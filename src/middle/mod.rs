//! Middle-end module - IR, builder and printer

pub mod ir;
pub mod builder;
pub mod ir_printer;
