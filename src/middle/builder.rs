//! IR Builder
//!
//! Owns the module under construction and an insertion point. Code generation
//! talks to the IR exclusively through this type.

use crate::middle::ir::*;

/// Position where new instructions are appended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPoint {
    pub function: usize,
    pub block: BlockId,
}

/// IR Builder
pub struct IRBuilder {
    module: IRModule,
    cursor: Option<InsertPoint>,
}

impl IRBuilder {
    pub fn new(module_name: &str) -> Self {
        Self {
            module: IRModule::new(module_name),
            cursor: None,
        }
    }

    pub fn module(&self) -> &IRModule {
        &self.module
    }

    /// Hand out the finished module
    pub fn finish(self) -> IRModule {
        self.module
    }

    // ==================== Module Level ====================

    /// Declare a function and return its (unique) symbol
    pub fn declare_function(
        &mut self,
        name: &str,
        params: Vec<IRType>,
        ret_type: IRType,
        sret_type: Option<IRType>,
    ) -> String {
        let mut symbol = name.to_string();
        let mut n = 1;
        while self.module.function(&symbol).is_some() {
            symbol = format!("{}.{}", name, n);
            n += 1;
        }
        let mut func = IRFunction::new(&symbol, params, ret_type);
        func.sret_type = sret_type;
        self.module.functions.push(func);
        symbol
    }

    pub fn add_struct(&mut self, name: &str, fields: Vec<IRType>, size: u64) {
        self.module.add_struct(name, fields, size);
    }

    /// Intern a string as a private constant blob; yields its address
    pub fn global_string(&mut self, text: &str) -> Value {
        let name = format!(".str.{}", self.module.globals.len());
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.module.globals.push(IRGlobal { name: name.clone(), bytes });
        Value::Global(name)
    }

    /// Give a declared function its entry block and move the cursor there
    pub fn begin_function(&mut self, symbol: &str) -> BlockId {
        let Some(index) = self.module.functions.iter().position(|f| f.name == symbol) else {
            panic!("function {} was never declared", symbol);
        };
        let func = &mut self.module.functions[index];
        assert!(func.is_declaration(), "function {} already has a body", symbol);
        let entry = func.add_block("entry");
        self.cursor = Some(InsertPoint { function: index, block: entry });
        entry
    }

    // ==================== Insertion Point ====================

    pub fn insert_point(&self) -> Option<InsertPoint> {
        self.cursor
    }

    pub fn restore_insert_point(&mut self, point: Option<InsertPoint>) {
        self.cursor = point;
    }

    fn cursor(&self) -> InsertPoint {
        match self.cursor {
            Some(point) => point,
            None => panic!("no insertion point"),
        }
    }

    pub fn current_function(&self) -> &IRFunction {
        &self.module.functions[self.cursor().function]
    }

    fn func_mut(&mut self) -> &mut IRFunction {
        let index = self.cursor().function;
        &mut self.module.functions[index]
    }

    pub fn current_block(&self) -> BlockId {
        self.cursor().block
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        let function = self.cursor().function;
        self.cursor = Some(InsertPoint { function, block });
    }

    /// Create a block in the current function without placing it
    pub fn create_block(&mut self, label: &str) -> BlockId {
        self.func_mut().create_block(label)
    }

    pub fn attach_block(&mut self, block: BlockId) {
        self.func_mut().attach_block(block);
    }

    /// Create a block and place it at the end of the layout
    pub fn append_block(&mut self, label: &str) -> BlockId {
        self.func_mut().add_block(label)
    }

    // ==================== Instructions ====================

    fn emit(&mut self, inst: Instruction) {
        let block = self.current_block();
        self.func_mut().block_mut(block).push(inst);
    }

    fn terminate(&mut self, term: Terminator) {
        let block = self.current_block();
        self.func_mut().block_mut(block).set_terminator(term);
    }

    fn fresh(&mut self) -> Register {
        self.func_mut().alloc_register()
    }

    /// Splice an `alloca` at `index` of the entry block
    pub fn insert_alloca(&mut self, index: usize, ty: IRType) -> Value {
        let func = self.func_mut();
        let Some(entry) = func.entry_block() else {
            panic!("alloca requested before the entry block of {} exists", func.name);
        };
        let dest = func.alloc_register();
        let block = func.block_mut(entry);
        assert!(index <= block.instructions.len(), "alloca cursor out of range");
        block.instructions.insert(index, Instruction::Alloca { dest, ty });
        Value::Register(dest)
    }

    pub fn build_binop(&mut self, op: BinOp, ty: IRType, left: Value, right: Value) -> Value {
        let dest = self.fresh();
        self.emit(Instruction::BinOp { dest, op, ty, left, right });
        Value::Register(dest)
    }

    pub fn build_cmp(&mut self, pred: CmpPred, ty: IRType, left: Value, right: Value) -> Value {
        let dest = self.fresh();
        self.emit(Instruction::Cmp { dest, pred, ty, left, right });
        Value::Register(dest)
    }

    pub fn build_unary(&mut self, op: UnaryOp, ty: IRType, value: Value) -> Value {
        let dest = self.fresh();
        self.emit(Instruction::UnaryOp { dest, op, ty, value });
        Value::Register(dest)
    }

    pub fn build_load(&mut self, ty: IRType, ptr: Value) -> Value {
        let dest = self.fresh();
        self.emit(Instruction::Load { dest, ptr, ty });
        Value::Register(dest)
    }

    pub fn build_store(&mut self, ty: IRType, value: Value, ptr: Value) {
        self.emit(Instruction::Store { ptr, value, ty });
    }

    pub fn build_struct_gep(&mut self, struct_name: &str, ptr: Value, index: usize) -> Value {
        let dest = self.fresh();
        self.emit(Instruction::StructGep {
            dest,
            ptr,
            struct_name: struct_name.to_string(),
            index,
        });
        Value::Register(dest)
    }

    pub fn build_memcpy(&mut self, dest: Value, src: Value, size: u64) {
        self.emit(Instruction::MemCpy { dest, src, size });
    }

    /// Emit a call; yields the result register unless `ret_ty` is void
    pub fn build_call(&mut self, func: &str, args: Vec<Value>, ret_ty: IRType) -> Option<Value> {
        let dest = if ret_ty == IRType::Void { None } else { Some(self.fresh()) };
        self.emit(Instruction::Call { dest, func: func.to_string(), args, ret_ty });
        dest.map(Value::Register)
    }

    pub fn build_ret(&mut self, value: Option<Value>) {
        self.terminate(Terminator::Return { value });
    }

    pub fn build_br(&mut self, target: BlockId) {
        self.terminate(Terminator::Jump { target });
    }

    pub fn build_cond_br(&mut self, cond: Value, then_target: BlockId, else_target: BlockId) {
        self.terminate(Terminator::Branch { cond, then_target, else_target });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloca_lands_in_entry_block() {
        let mut builder = IRBuilder::new("test");
        let symbol = builder.declare_function("test.f", vec![], IRType::Void, None);
        let entry = builder.begin_function(&symbol);

        let first = builder.insert_alloca(0, IRType::I32);
        builder.build_store(IRType::I32, Value::Constant(Constant::Int(1)), first.clone());
        let next = builder.append_block("next");
        builder.build_br(next);
        builder.position_at_end(next);

        // Requested while emitting a later block; must still land after the first slot.
        let second = builder.insert_alloca(1, IRType::F64);
        builder.build_ret(None);

        let func = builder.module().function("test.f").unwrap();
        let entry_insts = &func.block(entry).instructions;
        assert!(matches!(&entry_insts[0], Instruction::Alloca { ty: IRType::I32, .. }));
        assert!(matches!(&entry_insts[1], Instruction::Alloca { ty: IRType::F64, .. }));
        assert!(matches!(&entry_insts[2], Instruction::Store { .. }));
        assert!(func.block(next).instructions.is_empty());
        assert_ne!(first, second);
    }

    #[test]
    #[should_panic]
    fn test_alloca_without_entry_block_panics() {
        let mut builder = IRBuilder::new("test");
        builder.declare_function("test.f", vec![], IRType::Void, None);
        builder.restore_insert_point(Some(InsertPoint { function: 0, block: BlockId(0) }));
        builder.insert_alloca(0, IRType::I32);
    }

    #[test]
    fn test_declare_function_uniquifies_symbols() {
        let mut builder = IRBuilder::new("test");
        let a = builder.declare_function("m.f", vec![], IRType::Void, None);
        let b = builder.declare_function("m.f", vec![], IRType::Void, None);
        assert_eq!(a, "m.f");
        assert_eq!(b, "m.f.1");
    }

    #[test]
    fn test_global_string_is_nul_terminated() {
        let mut builder = IRBuilder::new("test");
        let value = builder.global_string("hi");
        assert_eq!(value, Value::Global(".str.0".to_string()));
        assert_eq!(builder.module().globals[0].bytes, b"hi\0".to_vec());
    }

    #[test]
    fn test_void_call_has_no_result() {
        let mut builder = IRBuilder::new("test");
        let symbol = builder.declare_function("test.f", vec![], IRType::Void, None);
        builder.begin_function(&symbol);
        assert_eq!(builder.build_call("test.g", vec![], IRType::Void), None);
        assert!(builder.build_call("test.h", vec![], IRType::I32).is_some());
    }
}
