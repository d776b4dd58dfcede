//! Code generation
//!
//! Walks the AST and drives the IR builder. `mod.rs` holds the program and
//! function level, `stmt.rs` statements and `expr.rs` expressions.

mod expr;
mod stmt;

use std::collections::HashMap;

use log::debug;

use crate::frontend::ast::{Ast, NodeId, NodeKind, Param};
use crate::frontend::parser::parse_source;
use crate::middle::builder::IRBuilder;
use crate::middle::ir::{Constant, IRModule, IRType, Value};
use crate::sema::{CfgChecker, FunctionSig, ScopeTree, TypeScanner};
use crate::types::{Object, TypeId, TypeRegistry};
use crate::utils::{Error, Result};

/// Result of compiling one program
pub struct CompiledModule {
    pub module: IRModule,
    pub registry: TypeRegistry,
    /// `(function symbol, Graphviz text)` for every compiled function
    pub cfg_graphs: Vec<(String, String)>,
}

/// Compile a parsed program into an IR module named `module_name`
pub fn compile(ast: &Ast, module_name: &str) -> Result<CompiledModule> {
    let mut compiler = Compiler::new(ast, module_name);
    let Some(root) = ast.root() else {
        return Err(Error::type_error("syntax tree has no program root"));
    };
    compiler.compile_program(root)?;
    Ok(compiler.finish())
}

/// Parse and compile `source` in one step
pub fn compile_source(source: &str, module_name: &str) -> Result<CompiledModule> {
    let ast = parse_source(source, 0)?;
    compile(&ast, module_name)
}

/// The code-generation visitor
pub struct Compiler<'a> {
    ast: &'a Ast,
    module_name: String,
    registry: TypeRegistry,
    builder: IRBuilder,
    scopes: ScopeTree,
    signatures: HashMap<NodeId, FunctionSig>,
    cfg_graphs: Vec<(String, String)>,
}

impl<'a> Compiler<'a> {
    pub fn new(ast: &'a Ast, module_name: &str) -> Self {
        Self {
            ast,
            module_name: module_name.to_string(),
            registry: TypeRegistry::new(),
            builder: IRBuilder::new(module_name),
            scopes: ScopeTree::new(),
            signatures: HashMap::new(),
            cfg_graphs: Vec::new(),
        }
    }

    pub fn finish(self) -> CompiledModule {
        CompiledModule {
            module: self.builder.finish(),
            registry: self.registry,
            cfg_graphs: self.cfg_graphs,
        }
    }

    /// Top-level statements become the body of `<module>.main`, which
    /// returns `i32` (0 unless the program returns something else).
    pub fn compile_program(&mut self, root: NodeId) -> Result<()> {
        let NodeKind::Program { body } = self.ast.kind(root) else {
            return Err(Error::type_error("expected a program node").at(self.ast.span(root)));
        };
        let body = *body;

        let entry = format!("{}.main", self.module_name);
        let entry = self.builder.declare_function(&entry, vec![], IRType::I32, None);

        let prefix = self.module_name.clone();
        self.scan(self.ast.stmts(body), &prefix)?;

        // Top level may fall off its end; only the merge verdict matters here
        let cfg = CfgChecker::check(self.ast, &entry, body);
        self.cfg_graphs.push((entry.clone(), cfg.to_dot()));

        debug!("compiling program entry {}", entry);
        self.builder.begin_function(&entry);
        let i32 = self.registry.builtins().i32;
        self.scopes.enter_function(&entry, Some(i32), false);

        let slot = self.alloc_object(i32);
        self.builder
            .build_store(IRType::I32, Value::Constant(Constant::Int(0)), slot.value().clone());
        self.scopes.init_return_value(slot);
        if cfg.needs_merge_block() {
            let block = self.builder.create_block("return");
            self.scopes.init_return_block(block);
        }

        let result = self.compile_stmts(self.ast.stmts(body));
        if result.is_ok() {
            self.finish_function();
        }
        self.scopes.exit();
        result
    }

    /// Compile a function or method whose signature the scanner registered
    pub(crate) fn compile_function(&mut self, node: NodeId) -> Result<()> {
        let NodeKind::FuncDecl { name, params, ret, body } = self.ast.kind(node) else {
            unreachable!("compile_function on a non-function node");
        };
        let span = self.ast.span(node);
        let Some(sig) = self.signatures.get(&node).cloned() else {
            panic!("function {} was never scanned", name);
        };

        let cfg = CfgChecker::check(self.ast, &sig.symbol, *body);
        self.cfg_graphs.push((sig.symbol.clone(), cfg.to_dot()));
        if ret.is_some() && !cfg.is_complete() {
            return Err(Error::MissingReturn { name: name.clone(), span });
        }

        let Some(func) = self.registry.as_function(sig.ty).cloned() else {
            unreachable!("signature of {} is not a function type", name);
        };
        debug!(
            "compiling {} ({} return(s), merge block: {})",
            sig.symbol,
            cfg.return_count(),
            cfg.needs_merge_block()
        );

        let saved = self.builder.insert_point();
        self.builder.begin_function(&sig.symbol);
        self.scopes.enter_function(&sig.symbol, func.ret, func.returns_by_pointer);

        let result = self.compile_function_body(&sig, &func.params, params, *body, cfg.needs_merge_block());

        self.scopes.exit();
        self.builder.restore_insert_point(saved);
        result
    }

    fn compile_function_body(
        &mut self,
        sig: &FunctionSig,
        param_types: &[TypeId],
        params: &[Param],
        body: NodeId,
        needs_merge: bool,
    ) -> Result<()> {
        let func_ret = self.scopes.function().ret;
        let by_pointer = self.scopes.function().by_pointer;

        // Return slot, or the caller's output buffer
        let mut next_param = 0;
        if let Some(ret) = func_ret {
            let slot = if by_pointer {
                next_param = 1;
                Object::new_addressable(ret, Value::Parameter(0))
            } else {
                self.alloc_object(ret)
            };
            self.scopes.init_return_value(slot);
        }

        let mut param_types = param_types.iter().copied();
        if let Some(owner) = sig.receiver {
            param_types.next();
            let this = Object::new_addressable(owner, Value::Parameter(next_param));
            self.scopes.declare("self", this)?;
            next_param += 1;
        }
        for (param, ty) in params.iter().zip(param_types) {
            let incoming = Value::Parameter(next_param);
            next_param += 1;
            let slot = self.alloc_object(ty);
            if self.registry.is_struct(ty) {
                self.builder
                    .build_memcpy(slot.value().clone(), incoming, self.registry.size_of(ty));
            } else {
                self.builder
                    .build_store(self.registry.ir_type(ty), incoming, slot.value().clone());
            }
            self.scopes.declare(&param.name, slot).map_err(|e| e.at(param.span))?;
        }

        if needs_merge {
            let block = self.builder.create_block("return");
            self.scopes.init_return_block(block);
        }

        self.compile_block(body)?;
        self.finish_function();
        Ok(())
    }

    /// Close the current function: route a still-open path to the exit and
    /// emit the epilogue in the merge block, if there is one
    fn finish_function(&mut self) {
        let merge = self.scopes.return_block();
        if !self.scopes.has_returned() {
            match merge {
                Some(block) => self.builder.build_br(block),
                None => self.emit_epilogue(),
            }
        }
        if let Some(block) = merge {
            self.builder.attach_block(block);
            self.builder.position_at_end(block);
            self.emit_epilogue();
        }
    }

    /// `ret` of the return slot, or `ret void`
    pub(crate) fn emit_epilogue(&mut self) {
        let state = self.scopes.function();
        let value = match (self.scopes.return_value(), state.by_pointer) {
            (Some(slot), false) => {
                let (ty, ptr) = (self.registry.ir_type(slot.ty()), slot.value().clone());
                Some(self.builder.build_load(ty, ptr))
            }
            _ => None,
        };
        self.builder.build_ret(value);
    }

    /// Scan a statement list for declarations, then compile it
    pub(crate) fn compile_block(&mut self, list: NodeId) -> Result<()> {
        let stmts = self.ast.stmts(list);
        let prefix = self.scopes.function().symbol.clone();
        self.scan(stmts, &prefix)?;
        self.compile_stmts(stmts)
    }

    fn scan(&mut self, stmts: &[NodeId], prefix: &str) -> Result<()> {
        TypeScanner::new(
            self.ast,
            &mut self.registry,
            &mut self.builder,
            &mut self.scopes,
            &mut self.signatures,
        )
        .scan(stmts, prefix)
    }

    /// Fresh entry-block slot holding a value of `ty`
    pub(crate) fn alloc_object(&mut self, ty: TypeId) -> Object {
        let address = self.scopes.allocate_slot(&mut self.builder, self.registry.ir_type(ty));
        Object::new_addressable(ty, address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::{IRFunction, Instruction, Terminator};
    use crate::middle::ir_printer::print_ir;
    use crate::utils::Span;

    fn compile_ok(source: &str) -> CompiledModule {
        match compile_source(source, "test") {
            Ok(module) => module,
            Err(err) => panic!("compilation failed: {}", err),
        }
    }

    fn compile_err(source: &str) -> Error {
        match compile_source(source, "test") {
            Ok(module) => panic!("expected an error, got\n{}", print_ir(&module.module)),
            Err(err) => err,
        }
    }

    fn function<'m>(compiled: &'m CompiledModule, name: &str) -> &'m IRFunction {
        compiled
            .module
            .function(name)
            .unwrap_or_else(|| panic!("no function {}", name))
    }

    fn return_count(func: &IRFunction) -> usize {
        func.ordered_blocks()
            .filter(|b| matches!(b.terminator, Some(Terminator::Return { .. })))
            .count()
    }

    fn assert_allocas_lead_entry(func: &IRFunction) {
        let entry = func.block(func.entry_block().unwrap());
        let first_other = entry
            .instructions
            .iter()
            .position(|i| !matches!(i, Instruction::Alloca { .. }))
            .unwrap_or(entry.instructions.len());
        assert!(entry.instructions[first_other..]
            .iter()
            .all(|i| !matches!(i, Instruction::Alloca { .. })));
        for block in func.ordered_blocks().skip(1) {
            assert!(!block.instructions.iter().any(|i| matches!(i, Instruction::Alloca { .. })));
        }
    }

    #[test]
    fn test_add_and_call() {
        let compiled = compile_ok(
            "func add(a: i32, b: i32) -> i32 { return a + b; }
             var n = add(2, 3);",
        );
        let add = function(&compiled, "test.add");
        assert_eq!(add.params, vec![IRType::I32, IRType::I32]);
        assert_eq!(add.ret_type, IRType::I32);
        assert_eq!(return_count(add), 1);
        assert_eq!(add.ordered_blocks().count(), 1);

        let main = function(&compiled, "test.main");
        let call = main
            .instructions()
            .find(|i| matches!(i, Instruction::Call { .. }))
            .cloned()
            .unwrap();
        match call {
            Instruction::Call { dest, func, args, ret_ty } => {
                assert!(dest.is_some());
                assert_eq!(func, "test.add");
                assert_eq!(
                    args,
                    vec![Value::Constant(Constant::Int(2)), Value::Constant(Constant::Int(3))]
                );
                assert_eq!(ret_ty, IRType::I32);
            }
            _ => unreachable!(),
        }
        assert_allocas_lead_entry(main);

        let (name, dot) = &compiled.cfg_graphs[1];
        assert_eq!(name, "test.add");
        assert_eq!(dot.matches("doublecircle").count(), 1);
    }

    #[test]
    fn test_missing_return() {
        let err = compile_err("func f() -> i32 { if (true) { return 1; } }");
        assert!(matches!(err, Error::MissingReturn { ref name, .. } if name == "f"));
        assert_ne!(err.span(), Span::dummy());
    }

    #[test]
    fn test_struct_assignment_is_block_copy() {
        let compiled = compile_ok(
            "struct Point { x: i32; y: i32; }
             var a: Point;
             var b: Point;
             b.x = 1;
             a = b;",
        );
        let point = compiled.registry.lookup("Point").unwrap();
        let st = compiled.registry.as_struct(point).unwrap();
        assert_eq!((st.field("x").unwrap().index, st.field("x").unwrap().offset), (0, 0));
        assert_eq!((st.field("y").unwrap().index, st.field("y").unwrap().offset), (1, 4));

        let main = function(&compiled, "test.main");
        let copies: Vec<_> = main
            .instructions()
            .filter(|i| matches!(i, Instruction::MemCpy { size: 8, .. }))
            .collect();
        assert_eq!(copies.len(), 1);
        assert!(!main
            .instructions()
            .any(|i| matches!(i, Instruction::Store { ty: IRType::Struct(_), .. })));
    }

    #[test]
    fn test_variable_needs_type_or_initializer() {
        let err = compile_err("var x;");
        assert!(matches!(err, Error::UninferableVariable { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_merge_block_for_multiple_returns() {
        let compiled = compile_ok(
            "func sign(x: i32) -> i32 {
                 if (x < 0) { return 0 - 1; } else if (x > 0) { return 1; }
                 return 0;
             }
             func id(x: i32) -> i32 { return x; }",
        );
        let sign = function(&compiled, "test.sign");
        assert_eq!(return_count(sign), 1);
        let last = sign.ordered_blocks().last().unwrap();
        assert_eq!(last.label, "return");
        assert_allocas_lead_entry(sign);

        let id = function(&compiled, "test.id");
        assert!(id.ordered_blocks().all(|b| b.label != "return"));
        assert_eq!(return_count(id), 1);
    }

    #[test]
    fn test_large_struct_returns_through_pointer() {
        let compiled = compile_ok(
            "struct Big { a: i32; b: i32; c: i32; d: i32; e: i32; }
             struct Pair { a: i32; b: i32; }
             func make(v: i32) -> Big { var r: Big; r.a = v; return r; }
             func pair(v: i32) -> Pair { var r: Pair; r.b = v; return r; }
             var big = make(1);
             var p = pair(2);",
        );
        let make = function(&compiled, "test.make");
        assert_eq!(make.ret_type, IRType::Void);
        assert_eq!(make.params[0], IRType::ptr(IRType::Struct("Big".to_string())));
        assert_eq!(make.params.len(), 2);
        assert!(make.sret_type.is_some());

        let pair = function(&compiled, "test.pair");
        assert_eq!(pair.ret_type, IRType::Struct("Pair".to_string()));
        assert_eq!(pair.params, vec![IRType::I32]);

        let main = function(&compiled, "test.main");
        let calls: Vec<_> = main
            .instructions()
            .filter_map(|i| match i {
                Instruction::Call { func, args, dest, .. } => Some((func.as_str(), args.len(), dest.is_some())),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec![("test.make", 2, false), ("test.pair", 1, true)]);
    }

    #[test]
    fn test_methods_and_pointers() {
        let compiled = compile_ok(
            "struct Counter {
                 n: i32;
                 func bump(by: i32) -> i32 { self.n = self.n + by; return self.n; }
             }
             var c: Counter;
             c.n = 0;
             var q: Counter* = &c;
             c.bump(2);
             q.bump(3);
             var total = q.n;",
        );
        let bump = function(&compiled, "test.Counter.bump");
        assert_eq!(bump.params[0], IRType::ptr(IRType::Struct("Counter".to_string())));

        let main = function(&compiled, "test.main");
        let bumps = main
            .instructions()
            .filter(|i| matches!(i, Instruction::Call { func, args, .. } if func == "test.Counter.bump" && args.len() == 2))
            .count();
        assert_eq!(bumps, 2);
    }

    #[test]
    fn test_loops_and_short_circuit() {
        let compiled = compile_ok(
            "func count(n: i32) -> i32 {
                 var i = 0;
                 while (i < n && i != 7) { i = i + 1; }
                 return i;
             }",
        );
        let count = function(&compiled, "test.count");
        let labels: Vec<_> = count.ordered_blocks().map(|b| b.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["entry", "loop.cond", "and.rhs", "and.end", "loop.body", "loop.end"]
        );
        assert_allocas_lead_entry(count);
        assert!(count.ordered_blocks().all(|b| b.terminator.is_some()));
    }

    #[test]
    fn test_declarations_after_return_are_compiled() {
        let compiled = compile_ok(
            "func outer() -> i32 { return inner(); func inner() -> i32 { return 1; } }
             return 0;
             func later() -> i32 { return outer(); }
             struct Box { v: i32; func get() -> i32 { return self.v; } }",
        );
        for name in ["test.outer", "test.outer.inner", "test.later", "test.Box.get"] {
            let func = function(&compiled, name);
            assert!(!func.is_declaration(), "{} has no body", name);
            assert_eq!(return_count(func), 1);
        }
        let graphs: Vec<_> = compiled.cfg_graphs.iter().map(|(name, _)| name.as_str()).collect();
        assert!(graphs.contains(&"test.outer.inner"));

        // The checker still runs on a body that follows a return
        let err = compile_err("return 0; func bad() -> i32 { if (true) { return 1; } }");
        assert!(matches!(err, Error::MissingReturn { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_or_with_both_branches_returning() {
        let compiled = compile_ok(
            "func pick(a: bool, b: bool) -> i32 {
                 if (a || b) { return 1; } else { return 2; }
             }",
        );
        let pick = function(&compiled, "test.pick");
        let labels: Vec<_> = pick.ordered_blocks().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["entry", "or.rhs", "or.end", "then", "else", "return"]);
        assert!(pick.ordered_blocks().all(|b| b.terminator.is_some()));
        assert_eq!(return_count(pick), 1);

        // A true left operand skips the right one
        let blocks: Vec<_> = pick.ordered_blocks().collect();
        let (rhs, end) = (blocks[1].id, blocks[2].id);
        match &blocks[0].terminator {
            Some(Terminator::Branch { then_target, else_target, .. }) => {
                assert_eq!((*then_target, *else_target), (end, rhs));
            }
            other => panic!("expected a conditional branch, got {:?}", other),
        }
        assert!(matches!(blocks[1].terminator, Some(Terminator::Jump { target }) if target == end));

        // Both branches jump to the shared exit block
        let exit = blocks[5].id;
        for branch in &blocks[3..5] {
            assert!(matches!(branch.terminator, Some(Terminator::Jump { target }) if target == exit));
        }
        assert_allocas_lead_entry(pick);
    }

    #[test]
    fn test_nested_function_sees_only_functions() {
        let compiled = compile_ok(
            "func outer(x: i32) -> i32 {
                 func inner(y: i32) -> i32 { return y * 2; }
                 return inner(x);
             }",
        );
        assert!(compiled.module.function("test.outer.inner").is_some());

        let err = compile_err(
            "func outer(x: i32) -> i32 {
                 func inner() -> i32 { return x; }
                 return inner();
             }",
        );
        assert!(matches!(err, Error::UnresolvedIdentifier { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_type_errors_are_reported() {
        assert!(matches!(
            compile_err("var x: i32 = 1.5;"),
            Error::TypeMismatch { .. }
        ));
        assert!(matches!(
            compile_err("func add(a: i32, b: i32) -> i32 { return a + b; } add(1);"),
            Error::ArgumentMismatch { .. }
        ));
        assert!(matches!(compile_err("y = 2;"), Error::UnresolvedIdentifier { .. }));
        assert!(matches!(compile_err("var x = 1; var x = 2;"), Error::DuplicateVariable { .. }));
        assert!(matches!(compile_err("var p: Nope;"), Error::UnknownType { .. }));
        assert!(matches!(compile_err("if (1) { }"), Error::TypeMismatch { .. }));
        assert!(matches!(compile_err("func f() { } var v = f();"), Error::TypeError { .. }));
        assert!(matches!(compile_err("func f() { return 1; }"), Error::ReturnMismatch { .. }));
        assert!(matches!(compile_err("3 = 4;"), Error::ReadOnly { .. }));
        assert!(matches!(
            compile_err("struct P { x: i32; } var p: P; p.z = 1;"),
            Error::UnknownField { .. }
        ));
    }

    #[test]
    fn test_strings_become_globals() {
        let compiled = compile_ok("var s = \"hi\"; var t: str = s;");
        assert_eq!(compiled.module.globals.len(), 1);
        assert_eq!(compiled.module.globals[0].bytes, b"hi\0".to_vec());
        assert!(print_ir(&compiled.module).contains("@.str.0 = private constant c\"hi\\00\""));
    }

    #[test]
    fn test_program_entry_returns_zero() {
        let compiled = compile_ok("var x = 1;");
        let main = function(&compiled, "test.main");
        assert_eq!(main.ret_type, IRType::I32);
        assert!(main.instructions().any(|i| matches!(
            i,
            Instruction::Store { value: Value::Constant(Constant::Int(0)), ty: IRType::I32, .. }
        )));
        assert_eq!(return_count(main), 1);
    }
}
