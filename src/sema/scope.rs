//! Scope hierarchy
//!
//! Global -> Function -> Local. Scopes live on a stack and are pushed and
//! popped in lock-step with the blocks the visitor walks, so the parent of a
//! scope is always the entry below it. Function scopes own the per-function
//! bookkeeping (return slot, merge block, alloca cursor); local scopes reach
//! it through the nearest enclosing function scope.

use std::collections::HashMap;

use log::trace;

use crate::middle::builder::IRBuilder;
use crate::middle::ir::{BlockId, IRType, Value};
use crate::types::{Object, TypeId};
use crate::utils::{Error, Result, Span};

/// Per-function state shared by every scope nested inside the function
#[derive(Debug)]
pub struct FunctionState {
    /// IR symbol of the function being compiled
    pub symbol: String,
    pub ret: Option<TypeId>,
    /// Result travels through the hidden output pointer
    pub by_pointer: bool,
    return_value: Option<Object>,
    return_block: Option<BlockId>,
    /// Insertion index of the next alloca in the entry block
    alloca_cursor: usize,
}

#[derive(Debug)]
pub enum ScopeKind {
    Global,
    Function(FunctionState),
    Local,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    symbols: HashMap<String, Object>,
    /// Every path through this scope so far ended in a return
    returned: bool,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self { kind, symbols: HashMap::new(), returned: false }
    }
}

/// Stack of nested scopes, rooted at the global scope
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self { scopes: vec![Scope::new(ScopeKind::Global)] }
    }

    pub fn enter_function(&mut self, symbol: &str, ret: Option<TypeId>, by_pointer: bool) {
        trace!("enter function scope {}", symbol);
        self.scopes.push(Scope::new(ScopeKind::Function(FunctionState {
            symbol: symbol.to_string(),
            ret,
            by_pointer,
            return_value: None,
            return_block: None,
            alloca_cursor: 0,
        })));
    }

    pub fn enter_local(&mut self) {
        self.scopes.push(Scope::new(ScopeKind::Local));
    }

    pub fn exit(&mut self) {
        assert!(self.scopes.len() > 1, "cannot leave the global scope");
        self.scopes.pop();
    }

    fn current(&self) -> &Scope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn current_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    // ==================== Symbols ====================

    /// Bind `name` in the innermost scope. Shadowing an outer name is fine.
    pub fn declare(&mut self, name: &str, object: Object) -> Result<()> {
        let scope = self.current_mut();
        if scope.symbols.contains_key(name) {
            return Err(Error::DuplicateVariable { name: name.to_string(), span: Span::dummy() });
        }
        scope.symbols.insert(name.to_string(), object);
        Ok(())
    }

    /// Search the scope chain. Once the search leaves a function scope only
    /// functions stay visible; an enclosing function's locals live in a
    /// different stack frame.
    pub fn lookup(&self, name: &str) -> Option<&Object> {
        let mut crossed_function = false;
        for scope in self.scopes.iter().rev() {
            if let Some(object) = scope.symbols.get(name) {
                if !crossed_function || matches!(object.value(), Value::Function(_)) {
                    return Some(object);
                }
            }
            if matches!(scope.kind, ScopeKind::Function(_)) {
                crossed_function = true;
            }
        }
        None
    }

    // ==================== Function State ====================

    pub fn function(&self) -> &FunctionState {
        for scope in self.scopes.iter().rev() {
            if let ScopeKind::Function(state) = &scope.kind {
                return state;
            }
        }
        panic!("no enclosing function scope");
    }

    fn function_mut(&mut self) -> &mut FunctionState {
        for scope in self.scopes.iter_mut().rev() {
            if let ScopeKind::Function(state) = &mut scope.kind {
                return state;
            }
        }
        panic!("no enclosing function scope");
    }

    /// New stack slot in the entry block of the current function. Slots
    /// keep declaration order and stay ahead of every other instruction of
    /// the entry block, wherever the builder is currently positioned.
    pub fn allocate_slot(&mut self, builder: &mut IRBuilder, ty: IRType) -> Value {
        let state = self.function_mut();
        let index = state.alloca_cursor;
        state.alloca_cursor += 1;
        trace!("slot {} of {}: {}", index, state.symbol, ty);
        builder.insert_alloca(index, ty)
    }

    pub fn init_return_value(&mut self, slot: Object) {
        let state = self.function_mut();
        assert!(state.return_value.is_none(), "return value of {} set twice", state.symbol);
        state.return_value = Some(slot);
    }

    pub fn return_value(&self) -> Option<&Object> {
        self.function().return_value.as_ref()
    }

    pub fn init_return_block(&mut self, block: BlockId) {
        let state = self.function_mut();
        assert!(state.return_block.is_none(), "return block of {} set twice", state.symbol);
        state.return_block = Some(block);
    }

    pub fn return_block(&self) -> Option<BlockId> {
        self.function().return_block
    }

    /// The path through the innermost scope has returned
    pub fn mark_returned(&mut self) {
        self.current_mut().returned = true;
    }

    pub fn has_returned(&self) -> bool {
        self.current().returned
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;

    fn var(ty: TypeId, n: usize) -> Object {
        Object::new_addressable(ty, Value::Parameter(n))
    }

    #[test]
    fn test_shadowing_and_duplicates() {
        let i32 = TypeRegistry::new().builtins().i32;
        let mut scopes = ScopeTree::new();
        scopes.enter_function("m.f", None, false);
        scopes.declare("x", var(i32, 0)).unwrap();
        let err = scopes.declare("x", var(i32, 1)).unwrap_err();
        assert!(matches!(err, Error::DuplicateVariable { ref name, .. } if name == "x"));

        scopes.enter_local();
        scopes.declare("x", var(i32, 2)).unwrap();
        assert_eq!(scopes.lookup("x"), Some(&var(i32, 2)));
        scopes.exit();
        assert_eq!(scopes.lookup("x"), Some(&var(i32, 0)));
        assert_eq!(scopes.lookup("y"), None);
    }

    #[test]
    fn test_enclosing_function_locals_are_hidden() {
        let mut reg = TypeRegistry::new();
        let i32 = reg.builtins().i32;
        let fn_ty = reg.function_type(vec![], None);
        let mut scopes = ScopeTree::new();
        scopes
            .declare("g", Object::new_register(fn_ty, Value::Function("m.g".to_string())))
            .unwrap();
        scopes.enter_function("m.outer", None, false);
        scopes.declare("local", var(i32, 0)).unwrap();
        scopes.enter_function("m.outer.inner", None, false);

        assert!(scopes.lookup("local").is_none());
        assert!(scopes.lookup("g").is_some());
        assert_eq!(scopes.function().symbol, "m.outer.inner");
        scopes.exit();
        assert_eq!(scopes.function().symbol, "m.outer");
        assert!(scopes.lookup("local").is_some());
    }

    #[test]
    fn test_returned_flag_is_per_scope() {
        let mut scopes = ScopeTree::new();
        scopes.enter_function("m.f", None, false);
        scopes.enter_local();
        scopes.mark_returned();
        assert!(scopes.has_returned());
        scopes.exit();
        assert!(!scopes.has_returned());
    }

    #[test]
    fn test_slots_share_the_function_cursor() {
        let mut builder = IRBuilder::new("m");
        let symbol = builder.declare_function("m.f", vec![], IRType::Void, None);
        let entry = builder.begin_function(&symbol);
        let mut scopes = ScopeTree::new();
        scopes.enter_function(&symbol, None, false);

        let a = scopes.allocate_slot(&mut builder, IRType::I32);
        builder.build_store(IRType::I32, Value::Parameter(0), a);
        let body = builder.append_block("body");
        builder.build_br(body);
        builder.position_at_end(body);

        scopes.enter_local();
        scopes.allocate_slot(&mut builder, IRType::F32);
        scopes.exit();
        scopes.allocate_slot(&mut builder, IRType::Bool);

        let func = builder.module().function("m.f").unwrap();
        let kinds: Vec<_> = func
            .block(entry)
            .instructions
            .iter()
            .map(|inst| match inst {
                crate::middle::ir::Instruction::Alloca { ty, .. } => ty.to_string(),
                _ => "other".to_string(),
            })
            .collect();
        assert_eq!(kinds, vec!["i32", "f32", "bool", "other"]);
        assert!(func.block(body).instructions.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_leaving_global_scope_panics() {
        ScopeTree::new().exit();
    }
}
