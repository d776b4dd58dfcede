//! Lona IR definitions
//!
//! Typed three-address code over basic blocks. There are no phi nodes: values
//! that merge across control flow travel through stack slots (`Alloca`).

use std::fmt;

/// IR Module - contains all functions, struct layouts and constant blobs
#[derive(Debug, Clone)]
pub struct IRModule {
    pub name: String,
    pub structs: Vec<IRStruct>,
    pub globals: Vec<IRGlobal>,
    pub functions: Vec<IRFunction>,
}

impl IRModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            structs: Vec::new(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn add_struct(&mut self, name: &str, fields: Vec<IRType>, size: u64) {
        self.structs.push(IRStruct { name: name.to_string(), fields, size });
    }

    pub fn function(&self, name: &str) -> Option<&IRFunction> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// IR Struct definition
#[derive(Debug, Clone, PartialEq)]
pub struct IRStruct {
    pub name: String,
    pub fields: Vec<IRType>,
    pub size: u64,
}

/// Private read-only byte blob (string constants)
#[derive(Debug, Clone, PartialEq)]
pub struct IRGlobal {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// IR Function
#[derive(Debug, Clone)]
pub struct IRFunction {
    pub name: String,
    pub params: Vec<IRType>,
    pub ret_type: IRType,
    /// Struct produced through the hidden leading output pointer, if any
    pub sret_type: Option<IRType>,
    /// Block storage, indexed by `BlockId`
    pub blocks: Vec<BasicBlock>,
    /// Emission order; blocks may be created detached and placed later
    pub layout: Vec<BlockId>,
    next_register: usize,
}

impl IRFunction {
    pub fn new(name: &str, params: Vec<IRType>, ret_type: IRType) -> Self {
        Self {
            name: name.to_string(),
            params,
            ret_type,
            sret_type: None,
            blocks: Vec::new(),
            layout: Vec::new(),
            next_register: 0,
        }
    }

    /// A function with no body yet
    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    /// First block in layout order
    pub fn entry_block(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    /// Create a block that is not yet part of the layout
    pub fn create_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::new(id, label));
        id
    }

    /// Place a detached block at the end of the layout
    pub fn attach_block(&mut self, id: BlockId) {
        assert!(!self.layout.contains(&id), "block {:?} attached twice", id);
        self.layout.push(id);
    }

    pub fn add_block(&mut self, label: &str) -> BlockId {
        let id = self.create_block(label);
        self.attach_block(id);
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    /// Blocks in layout order
    pub fn ordered_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.layout.iter().map(|id| &self.blocks[id.0])
    }

    pub fn alloc_register(&mut self) -> Register {
        let reg = Register(self.next_register);
        self.next_register += 1;
        reg
    }

    /// All instructions in layout order
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.ordered_blocks().flat_map(|b| b.instructions.iter())
    }
}

/// Basic Block - a sequence of instructions with single entry/exit
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: &str) -> Self {
        Self {
            id,
            label: label.to_string(),
            instructions: Vec::new(),
            terminator: None,
        }
    }

    pub fn push(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    pub fn set_terminator(&mut self, term: Terminator) {
        assert!(self.terminator.is_none(), "block {} terminated twice", self.label);
        self.terminator = Some(term);
    }
}

/// Block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// Virtual register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(pub usize);

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// IR Instruction (non-terminating)
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// dest = op ty left, right
    BinOp { dest: Register, op: BinOp, ty: IRType, left: Value, right: Value },

    /// dest = cmp pred ty left, right
    Cmp { dest: Register, pred: CmpPred, ty: IRType, left: Value, right: Value },

    /// dest = op ty value
    UnaryOp { dest: Register, op: UnaryOp, ty: IRType, value: Value },

    /// dest = call func(args...)
    Call { dest: Option<Register>, func: String, args: Vec<Value>, ret_ty: IRType },

    /// dest = alloca ty
    Alloca { dest: Register, ty: IRType },

    /// dest = load ty, ptr
    Load { dest: Register, ptr: Value, ty: IRType },

    /// store ty value, ptr
    Store { ptr: Value, value: Value, ty: IRType },

    /// dest = address of field `index` of the struct at ptr
    StructGep { dest: Register, ptr: Value, struct_name: String, index: usize },

    /// memcpy dest <- src, size bytes
    MemCpy { dest: Value, src: Value, size: u64 },
}

/// Block terminator
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// ret value
    Return { value: Option<Value> },

    /// br target
    Jump { target: BlockId },

    /// br cond, then_target, else_target
    Branch { cond: Value, then_target: BlockId, else_target: BlockId },
}

/// IR Value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Register(Register),
    Constant(Constant),
    Parameter(usize),
    Global(String),
    Function(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Register(r) => write!(f, "{}", r),
            Value::Constant(c) => write!(f, "{}", c),
            Value::Parameter(i) => write!(f, "%arg{}", i),
            Value::Global(name) => write!(f, "@{}", name),
            Value::Function(name) => write!(f, "@{}", name),
        }
    }
}

/// Constant value
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Float(n) => write!(f, "{:?}", n),
            Constant::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add, Sub, Mul,
    SDiv, UDiv, FDiv,
    SRem, URem, FRem,
    And, Or, Xor,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::UDiv => "udiv",
            BinOp::FDiv => "fdiv",
            BinOp::SRem => "srem",
            BinOp::URem => "urem",
            BinOp::FRem => "frem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
        };
        write!(f, "{}", s)
    }
}

/// Comparison predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpPred {
    Eq, Ne,
    SLt, SLe, SGt, SGe,
    ULt, ULe, UGt, UGe,
    OEq, ONe, OLt, OLe, OGt, OGe,
}

impl fmt::Display for CmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::SLt => "slt",
            CmpPred::SLe => "sle",
            CmpPred::SGt => "sgt",
            CmpPred::SGe => "sge",
            CmpPred::ULt => "ult",
            CmpPred::ULe => "ule",
            CmpPred::UGt => "ugt",
            CmpPred::UGe => "uge",
            CmpPred::OEq => "oeq",
            CmpPred::ONe => "one",
            CmpPred::OLt => "olt",
            CmpPred::OLe => "ole",
            CmpPred::OGt => "ogt",
            CmpPred::OGe => "oge",
        };
        write!(f, "{}", s)
    }
}

/// Unary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation (integer or float, by type)
    Neg,
    /// Logical not on bool
    Not,
    /// Bitwise complement on integers
    BitNot,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
            UnaryOp::BitNot => "bitnot",
        };
        write!(f, "{}", s)
    }
}

/// IR Type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IRType {
    Void,
    Bool,
    I8, I16, I32, I64,
    U8, U16, U32, U64,
    F32, F64,
    Ptr(Box<IRType>),
    Struct(String),
    Function { params: Vec<IRType>, ret: Box<IRType> },
}

impl IRType {
    pub fn ptr(inner: IRType) -> Self {
        IRType::Ptr(Box::new(inner))
    }
}

impl fmt::Display for IRType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IRType::Void => write!(f, "void"),
            IRType::Bool => write!(f, "bool"),
            IRType::I8 => write!(f, "i8"),
            IRType::I16 => write!(f, "i16"),
            IRType::I32 => write!(f, "i32"),
            IRType::I64 => write!(f, "i64"),
            IRType::U8 => write!(f, "u8"),
            IRType::U16 => write!(f, "u16"),
            IRType::U32 => write!(f, "u32"),
            IRType::U64 => write!(f, "u64"),
            IRType::F32 => write!(f, "f32"),
            IRType::F64 => write!(f, "f64"),
            IRType::Ptr(inner) => write!(f, "{}*", inner),
            IRType::Struct(name) => write!(f, "%{}", name),
            IRType::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
        }
    }
}
