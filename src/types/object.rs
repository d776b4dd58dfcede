//! Object model
//!
//! An `Object` is the operand every codegen step hands to the next one. It is
//! either a register rvalue (the IR value *is* the data) or an addressable
//! lvalue (the IR value is the address of the data). Struct objects are always
//! addressable; their value is the address of their bytes.

use bitflags::bitflags;

use crate::middle::builder::IRBuilder;
use crate::middle::ir::Value;
use crate::types::type_system::{TypeId, TypeRegistry};
use crate::utils::{Error, Result, Span};

bitflags! {
    /// Storage and access flags of an object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u8 {
        /// Backed by a stable memory location
        const ADDRESSABLE = 1 << 0;
        /// Already materialized; reading needs no load
        const REGISTER = 1 << 1;
        /// Writes are rejected
        const READ_ONLY = 1 << 2;
    }
}

/// A compiled value
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    ty: TypeId,
    value: Value,
    flags: ObjectFlags,
}

impl Object {
    pub fn new_register(ty: TypeId, value: Value) -> Self {
        Self { ty, value, flags: ObjectFlags::REGISTER }
    }

    pub fn new_addressable(ty: TypeId, address: Value) -> Self {
        Self { ty, value: address, flags: ObjectFlags::ADDRESSABLE }
    }

    /// Same storage, but every write is rejected
    pub fn read_only_view(&self) -> Self {
        Self {
            ty: self.ty,
            value: self.value.clone(),
            flags: self.flags | ObjectFlags::READ_ONLY,
        }
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    /// Raw IR storage: the value itself for registers, the address otherwise
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn is_addressable(&self) -> bool {
        self.flags.contains(ObjectFlags::ADDRESSABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.is_addressable() && !self.flags.contains(ObjectFlags::READ_ONLY)
    }

    /// Materialize the value. Structs read as their address.
    pub fn read(&self, registry: &TypeRegistry, builder: &mut IRBuilder) -> Value {
        if self.flags.contains(ObjectFlags::REGISTER) || registry.is_struct(self.ty) {
            return self.value.clone();
        }
        builder.build_load(registry.ir_type(self.ty), self.value.clone())
    }

    /// Store `src` into this object. Structs are block-copied.
    pub fn write(&self, registry: &TypeRegistry, builder: &mut IRBuilder, src: &Object) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::ReadOnly { span: Span::dummy() });
        }
        if src.ty != self.ty {
            return Err(Error::mismatch(registry.name(self.ty), registry.name(src.ty)));
        }

        if registry.is_struct(self.ty) {
            let size = registry.size_of(self.ty);
            assert_eq!(size, registry.size_of(src.ty), "struct copy between differently sized objects");
            let from = src.read(registry, builder);
            builder.build_memcpy(self.value.clone(), from, size);
        } else {
            let value = src.read(registry, builder);
            builder.build_store(registry.ir_type(self.ty), value, self.value.clone());
        }
        Ok(())
    }
}
