//! Type System for Lona
//!
//! Every type lives in one `TypeRegistry` for the whole compilation and is
//! referred to by a `TypeId` handle. Handles compare by identity: two structs
//! with identical fields are still different types. Pointer and function
//! types are interned, so structurally equal pointers and identical
//! signatures always come back as the same handle.

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace};

use crate::frontend::ast::TypeExpr;
use crate::middle::ir::IRType;
use crate::utils::{Error, Result, Span};

/// Struct returns larger than this many bytes go through a hidden output pointer
pub const SRET_THRESHOLD: u64 = 16;

/// Size of pointers and function handles on the target
const POINTER_SIZE: u64 = 8;

/// Handle to a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scalar kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I8, I16, I32, I64,
    U8, U16, U32, U64,
    F32, F64,
    Bool,
}

impl ScalarKind {
    /// Get the size in bytes
    pub fn size_of(&self) -> u64 {
        match self {
            Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Check if this is a signed integer type
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::U16 | Self::U32 | Self::U64
        )
    }

    /// Check if this is a floating-point type
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    fn ir_type(&self) -> IRType {
        match self {
            Self::I8 => IRType::I8,
            Self::I16 => IRType::I16,
            Self::I32 => IRType::I32,
            Self::I64 => IRType::I64,
            Self::U8 => IRType::U8,
            Self::U16 => IRType::U16,
            Self::U32 => IRType::U32,
            Self::U64 => IRType::U64,
            Self::F32 => IRType::F32,
            Self::F64 => IRType::F64,
            Self::Bool => IRType::Bool,
        }
    }
}

/// A laid-out struct member
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: TypeId,
    /// Declaration position; also the GEP index
    pub index: usize,
    /// Byte offset from the start of the struct
    pub offset: u64,
}

/// A method registered on a struct
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    /// Function type; its first parameter is the receiver pointer
    pub func: TypeId,
    /// IR symbol of the compiled body
    pub symbol: String,
}

/// Struct type; starts opaque and is completed exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub fields: Vec<StructField>,
    pub methods: Vec<Method>,
    pub size: u64,
    pub align: u64,
    pub complete: bool,
}

impl StructType {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Function signature type
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub params: Vec<TypeId>,
    pub ret: Option<TypeId>,
    /// Result is written through a hidden leading output pointer
    pub returns_by_pointer: bool,
}

/// Type variants
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Scalar(ScalarKind),
    Struct(StructType),
    Function(FunctionType),
    /// One level of indirection; pointer-to-pointer nests
    Pointer(TypeId),
}

/// A registered type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub name: String,
    pub kind: TypeKind,
}

/// Handles of the built-in types
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    pub i8: TypeId,
    pub i16: TypeId,
    pub i32: TypeId,
    pub i64: TypeId,
    pub u8: TypeId,
    pub u16: TypeId,
    pub u32: TypeId,
    pub u64: TypeId,
    pub f32: TypeId,
    pub f64: TypeId,
    pub bool: TypeId,
    /// `str`, an alias of `i8*`
    pub str: TypeId,
}

/// Type registry
pub struct TypeRegistry {
    types: Vec<TypeInfo>,
    by_name: HashMap<String, TypeId>,
    /// pointee -> pointer
    pointers: HashMap<TypeId, TypeId>,
    /// canonical signature key -> function type
    functions: HashMap<String, TypeId>,
    builtins: Builtins,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut types = Vec::new();
        let mut by_name = HashMap::new();
        let mut scalar = |name: &str, kind: ScalarKind| {
            let id = TypeId(types.len() as u32);
            types.push(TypeInfo { name: name.to_string(), kind: TypeKind::Scalar(kind) });
            by_name.insert(name.to_string(), id);
            id
        };

        let i8 = scalar("i8", ScalarKind::I8);
        let i16 = scalar("i16", ScalarKind::I16);
        let i32 = scalar("i32", ScalarKind::I32);
        let i64 = scalar("i64", ScalarKind::I64);
        let u8 = scalar("u8", ScalarKind::U8);
        let u16 = scalar("u16", ScalarKind::U16);
        let u32 = scalar("u32", ScalarKind::U32);
        let u64 = scalar("u64", ScalarKind::U64);
        let f32 = scalar("f32", ScalarKind::F32);
        let f64 = scalar("f64", ScalarKind::F64);
        let bool = scalar("bool", ScalarKind::Bool);

        let mut registry = Self {
            types,
            by_name,
            pointers: HashMap::new(),
            functions: HashMap::new(),
            builtins: Builtins {
                i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool,
                str: i8,
            },
        };
        let str = registry.pointer_to(i8);
        registry.by_name.insert("str".to_string(), str);
        registry.builtins.str = str;
        registry
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    fn push(&mut self, name: String, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeInfo { name, kind });
        id
    }

    // ==================== Lookup ====================

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.types[id.0 as usize]
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.get(id).kind
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.get(id).name
    }

    /// Find a named (scalar, struct or alias) type
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn as_struct(&self, id: TypeId) -> Option<&StructType> {
        match self.kind(id) {
            TypeKind::Struct(st) => Some(st),
            _ => None,
        }
    }

    pub fn as_function(&self, id: TypeId) -> Option<&FunctionType> {
        match self.kind(id) {
            TypeKind::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Pointer(inner) => Some(*inner),
            _ => None,
        }
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Struct(_))
    }

    pub fn is_complete(&self, id: TypeId) -> bool {
        match self.kind(id) {
            TypeKind::Struct(st) => st.complete,
            _ => true,
        }
    }

    /// Byte size. Asking for the size of an opaque struct is a compiler bug.
    pub fn size_of(&self, id: TypeId) -> u64 {
        match self.kind(id) {
            TypeKind::Scalar(kind) => kind.size_of(),
            TypeKind::Pointer(_) | TypeKind::Function(_) => POINTER_SIZE,
            TypeKind::Struct(st) => {
                assert!(st.complete, "size of opaque struct {}", self.name(id));
                st.size
            }
        }
    }

    pub fn align_of(&self, id: TypeId) -> u64 {
        match self.kind(id) {
            TypeKind::Scalar(kind) => kind.size_of(),
            TypeKind::Pointer(_) | TypeKind::Function(_) => POINTER_SIZE,
            TypeKind::Struct(st) => {
                assert!(st.complete, "alignment of opaque struct {}", self.name(id));
                st.align
            }
        }
    }

    // ==================== Resolution ====================

    /// Resolve a parsed annotation. Each suffix adds one Pointer layer;
    /// arrays decay to a pointer to their element.
    pub fn resolve(&mut self, expr: &TypeExpr) -> Result<TypeId> {
        let Some(mut ty) = self.lookup(&expr.name) else {
            return Err(Error::UnknownType { name: expr.name.clone(), span: expr.span });
        };
        for _ in &expr.suffixes {
            ty = self.pointer_to(ty);
        }
        Ok(ty)
    }

    /// The interned pointer type to `pointee`
    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        if let Some(&ptr) = self.pointers.get(&pointee) {
            return ptr;
        }
        let name = format!("{}*", self.name(pointee));
        let ptr = self.push(name, TypeKind::Pointer(pointee));
        trace!("interned pointer type {} as {}", self.name(ptr), ptr);
        self.pointers.insert(pointee, ptr);
        ptr
    }

    // ==================== Structs ====================

    /// Reserve a struct name; the layout is filled in by `complete_struct`
    pub fn register_struct(&mut self, name: &str, span: Span) -> Result<TypeId> {
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateType { name: name.to_string(), span });
        }
        let id = self.push(
            name.to_string(),
            TypeKind::Struct(StructType {
                fields: Vec::new(),
                methods: Vec::new(),
                size: 0,
                align: 1,
                complete: false,
            }),
        );
        self.by_name.insert(name.to_string(), id);
        debug!("registered opaque struct {}", name);
        Ok(id)
    }

    /// Lay out an opaque struct. Fields are placed in order at their
    /// natural alignment. Every field type must already be complete.
    pub fn complete_struct(&mut self, id: TypeId, fields: Vec<(String, TypeId)>) {
        let mut laid_out = Vec::with_capacity(fields.len());
        let mut offset = 0;
        let mut align = 1;
        for (index, (name, ty)) in fields.into_iter().enumerate() {
            let field_align = self.align_of(ty);
            offset = round_up(offset, field_align);
            laid_out.push(StructField { name, ty, index, offset });
            offset += self.size_of(ty);
            align = align.max(field_align);
        }
        let size = round_up(offset, align);

        let name = self.name(id).to_string();
        let TypeKind::Struct(st) = &mut self.types[id.0 as usize].kind else {
            panic!("complete_struct on non-struct type {}", name);
        };
        assert!(!st.complete, "struct {} completed twice", name);
        st.fields = laid_out;
        st.size = size;
        st.align = align;
        st.complete = true;
        debug!("completed struct {} (size {}, align {})", name, size, align);
    }

    pub fn add_method(&mut self, id: TypeId, name: &str, func: TypeId, symbol: &str) {
        let TypeKind::Struct(st) = &mut self.types[id.0 as usize].kind else {
            panic!("add_method on non-struct type");
        };
        st.methods.push(Method {
            name: name.to_string(),
            func,
            symbol: symbol.to_string(),
        });
    }

    // ==================== Functions ====================

    /// The interned function type for a signature. Identical signatures
    /// share one handle; call checking relies on that.
    pub fn function_type(&mut self, params: Vec<TypeId>, ret: Option<TypeId>) -> TypeId {
        let ret_name = ret.map_or("void", |r| self.name(r)).to_string();
        let param_names: Vec<&str> = params.iter().map(|p| self.name(*p)).collect();
        let key = format!("{}({})", ret_name, param_names.join(","));
        if let Some(&id) = self.functions.get(&key) {
            return id;
        }

        let returns_by_pointer = match ret {
            Some(r) => self.is_struct(r) && self.size_of(r) > SRET_THRESHOLD,
            None => false,
        };
        let name = format!("fn({}) -> {}", param_names.join(", "), ret_name);
        let id = self.push(
            name,
            TypeKind::Function(FunctionType { params, ret, returns_by_pointer }),
        );
        trace!("interned function type {} as {}", key, id);
        self.functions.insert(key, id);
        id
    }

    // ==================== IR Mapping ====================

    /// IR representation of a value of this type
    pub fn ir_type(&self, id: TypeId) -> IRType {
        match self.kind(id) {
            TypeKind::Scalar(kind) => kind.ir_type(),
            TypeKind::Pointer(inner) => IRType::ptr(self.ir_type(*inner)),
            TypeKind::Struct(_) => IRType::Struct(self.name(id).to_string()),
            TypeKind::Function(_) => {
                let (params, ret, _) = self.ir_signature(id);
                IRType::Function { params, ret: Box::new(ret) }
            }
        }
    }

    /// Lowered signature of a function type: parameter list, return type and
    /// the struct type of the hidden output pointer, if any. Struct
    /// parameters travel as pointers to the caller's bytes.
    pub fn ir_signature(&self, id: TypeId) -> (Vec<IRType>, IRType, Option<IRType>) {
        let Some(func) = self.as_function(id) else {
            panic!("ir_signature of non-function type {}", self.name(id));
        };
        let mut params = Vec::new();
        let mut sret = None;
        let ret = match func.ret {
            Some(r) if func.returns_by_pointer => {
                let ty = self.ir_type(r);
                params.push(IRType::ptr(ty.clone()));
                sret = Some(ty);
                IRType::Void
            }
            Some(r) => self.ir_type(r),
            None => IRType::Void,
        };
        for &p in &func.params {
            let ty = self.ir_type(p);
            params.push(if self.is_struct(p) { IRType::ptr(ty) } else { ty });
        }
        (params, ret, sret)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::TypeSuffix;

    fn type_expr(name: &str, suffixes: Vec<TypeSuffix>) -> TypeExpr {
        TypeExpr { name: name.to_string(), suffixes, span: Span::dummy() }
    }

    #[test]
    fn test_builtins_resolve() {
        let mut reg = TypeRegistry::new();
        let i32 = reg.resolve(&type_expr("i32", vec![])).unwrap();
        assert_eq!(i32, reg.builtins().i32);
        assert_eq!(reg.size_of(reg.builtins().f64), 8);
        assert_eq!(reg.size_of(reg.builtins().bool), 1);
    }

    #[test]
    fn test_unknown_type() {
        let mut reg = TypeRegistry::new();
        let err = reg.resolve(&type_expr("Nope", vec![])).unwrap_err();
        assert!(matches!(err, Error::UnknownType { ref name, .. } if name == "Nope"));
    }

    #[test]
    fn test_pointer_interning_identity() {
        let mut reg = TypeRegistry::new();
        let a = reg.resolve(&type_expr("i32", vec![TypeSuffix::Pointer, TypeSuffix::Pointer])).unwrap();
        let b = reg.resolve(&type_expr("i32", vec![TypeSuffix::Pointer, TypeSuffix::Pointer])).unwrap();
        assert_eq!(a, b);

        // Nested Pointer-of-Pointer, never a level count
        let inner = reg.pointee(a).unwrap();
        assert_eq!(reg.pointee(inner), Some(reg.builtins().i32));
        assert_eq!(reg.name(a), "i32**");

        // Array suffixes decay to the same pointer layer
        let arr = reg.resolve(&type_expr("i32", vec![TypeSuffix::Array(Some(4))])).unwrap();
        assert_eq!(arr, inner);
    }

    #[test]
    fn test_str_is_i8_pointer() {
        let mut reg = TypeRegistry::new();
        let i8 = reg.builtins().i8;
        assert_eq!(reg.pointer_to(i8), reg.builtins().str);
    }

    #[test]
    fn test_struct_layout() {
        let mut reg = TypeRegistry::new();
        let b = *reg.builtins();
        let point = reg.register_struct("Point", Span::dummy()).unwrap();
        assert!(!reg.is_complete(point));
        reg.complete_struct(point, vec![("x".to_string(), b.i32), ("y".to_string(), b.i32)]);

        let st = reg.as_struct(point).unwrap();
        assert_eq!(st.field("x").unwrap().index, 0);
        assert_eq!(st.field("x").unwrap().offset, 0);
        assert_eq!(st.field("y").unwrap().index, 1);
        assert_eq!(st.field("y").unwrap().offset, 4);
        assert_eq!(reg.size_of(point), 8);

        let mixed = reg.register_struct("Mixed", Span::dummy()).unwrap();
        reg.complete_struct(
            mixed,
            vec![("flag".to_string(), b.bool), ("value".to_string(), b.i64), ("tail".to_string(), b.u8)],
        );
        let st = reg.as_struct(mixed).unwrap();
        assert_eq!(st.field("value").unwrap().offset, 8);
        assert_eq!(st.field("tail").unwrap().offset, 16);
        assert_eq!(reg.size_of(mixed), 24);
    }

    #[test]
    fn test_duplicate_struct() {
        let mut reg = TypeRegistry::new();
        reg.register_struct("Point", Span::dummy()).unwrap();
        let err = reg.register_struct("Point", Span::dummy()).unwrap_err();
        assert!(matches!(err, Error::DuplicateType { .. }));
        assert!(matches!(
            reg.register_struct("i32", Span::dummy()),
            Err(Error::DuplicateType { .. })
        ));
    }

    #[test]
    #[should_panic]
    fn test_double_completion_panics() {
        let mut reg = TypeRegistry::new();
        let s = reg.register_struct("S", Span::dummy()).unwrap();
        reg.complete_struct(s, vec![]);
        reg.complete_struct(s, vec![]);
    }

    #[test]
    fn test_function_interning_and_sret_flag() {
        let mut reg = TypeRegistry::new();
        let b = *reg.builtins();
        let f1 = reg.function_type(vec![b.i32, b.i32], Some(b.i32));
        let f2 = reg.function_type(vec![b.i32, b.i32], Some(b.i32));
        let f3 = reg.function_type(vec![b.i32], Some(b.i32));
        assert_eq!(f1, f2);
        assert_ne!(f1, f3);
        assert!(!reg.as_function(f1).unwrap().returns_by_pointer);

        let small = reg.register_struct("Pair", Span::dummy()).unwrap();
        reg.complete_struct(small, vec![("a".to_string(), b.i64), ("b".to_string(), b.i64)]);
        let big = reg.register_struct("Big", Span::dummy()).unwrap();
        reg.complete_struct(
            big,
            (0..5).map(|i| (format!("f{}", i), b.i32)).collect(),
        );
        assert_eq!(reg.size_of(big), 20);

        let ret_small = reg.function_type(vec![], Some(small));
        let ret_big = reg.function_type(vec![], Some(big));
        assert!(!reg.as_function(ret_small).unwrap().returns_by_pointer);
        assert!(reg.as_function(ret_big).unwrap().returns_by_pointer);

        let (params, ret, sret) = reg.ir_signature(ret_big);
        assert_eq!(params, vec![IRType::ptr(IRType::Struct("Big".to_string()))]);
        assert_eq!(ret, IRType::Void);
        assert_eq!(sret, Some(IRType::Struct("Big".to_string())));
    }
}
