//! Type scanner
//!
//! Registers every struct and function signature of one statement list before
//! any of its bodies is compiled, so declarations can refer to each other in
//! any order. Runs once for the top level and again for every block that may
//! hold nested declarations.

use std::collections::HashMap;

use log::debug;

use crate::frontend::ast::{Ast, FieldDecl, NodeId, NodeKind, Param, TypeExpr};
use crate::middle::builder::IRBuilder;
use crate::middle::ir::Value;
use crate::sema::scope::ScopeTree;
use crate::types::{Object, TypeId, TypeRegistry};
use crate::utils::{Error, Result};

/// Signature registered for a `FuncDecl` node
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    pub symbol: String,
    pub ty: TypeId,
    /// Struct type of the receiver when the function is a method
    pub receiver: Option<TypeId>,
}

#[derive(Clone, Copy, PartialEq)]
enum Layout {
    InProgress,
    Done,
}

pub struct TypeScanner<'a> {
    ast: &'a Ast,
    registry: &'a mut TypeRegistry,
    builder: &'a mut IRBuilder,
    scopes: &'a mut ScopeTree,
    signatures: &'a mut HashMap<NodeId, FunctionSig>,
}

impl<'a> TypeScanner<'a> {
    pub fn new(
        ast: &'a Ast,
        registry: &'a mut TypeRegistry,
        builder: &'a mut IRBuilder,
        scopes: &'a mut ScopeTree,
        signatures: &'a mut HashMap<NodeId, FunctionSig>,
    ) -> Self {
        Self { ast, registry, builder, scopes, signatures }
    }

    /// Scan the direct children of one statement list. Symbols of the
    /// declarations found are prefixed with `prefix`.
    pub fn scan(&mut self, stmts: &[NodeId], prefix: &str) -> Result<()> {
        // Pass 1: reserve struct names
        let mut structs = Vec::new();
        for &stmt in stmts {
            if let NodeKind::StructDecl { name, .. } = self.ast.kind(stmt) {
                let id = self.registry.register_struct(name, self.ast.span(stmt))?;
                structs.push((stmt, id));
            }
        }

        // Pass 2: lay them out, dependencies first
        let mut state = HashMap::new();
        for i in 0..structs.len() {
            self.complete(i, &structs, &mut state)?;
        }

        // Pass 3: methods
        for &(stmt, id) in &structs {
            let NodeKind::StructDecl { name, methods, .. } = self.ast.kind(stmt) else {
                unreachable!();
            };
            for &method in methods {
                self.register_method(method, id, &format!("{}.{}", prefix, name))?;
            }
        }

        // Pass 4: free functions
        for &stmt in stmts {
            if let NodeKind::FuncDecl { name, params, ret, .. } = self.ast.kind(stmt) {
                let span = self.ast.span(stmt);
                let param_types = self.resolve_params(params)?;
                let ty = self.signature(param_types, ret.as_ref())?;
                let symbol = self.declare(&format!("{}.{}", prefix, name), ty);

                let callee = Object::new_register(ty, Value::Function(symbol.clone())).read_only_view();
                self.scopes.declare(name, callee).map_err(|e| e.at(span))?;
                debug!("registered function {} as {}: {}", name, symbol, self.registry.name(ty));
                self.signatures.insert(stmt, FunctionSig { symbol, ty, receiver: None });
            }
        }
        Ok(())
    }

    fn complete(
        &mut self,
        index: usize,
        structs: &[(NodeId, TypeId)],
        state: &mut HashMap<TypeId, Layout>,
    ) -> Result<()> {
        let (stmt, id) = structs[index];
        match state.get(&id) {
            Some(Layout::Done) => return Ok(()),
            Some(Layout::InProgress) => {
                return Err(Error::TypeError {
                    message: format!("recursive struct {}", self.registry.name(id)),
                    span: self.ast.span(stmt),
                })
            }
            None => {}
        }
        state.insert(id, Layout::InProgress);

        let NodeKind::StructDecl { fields, .. } = self.ast.kind(stmt) else {
            unreachable!();
        };
        let mut laid_out: Vec<(String, TypeId)> = Vec::with_capacity(fields.len());
        for FieldDecl { name, ty, span } in fields {
            if laid_out.iter().any(|(n, _)| n == name) {
                return Err(Error::DuplicateVariable { name: name.clone(), span: *span });
            }
            let field_ty = self.registry.resolve(ty)?;
            if !self.registry.is_complete(field_ty) {
                match structs.iter().position(|&(_, s)| s == field_ty) {
                    Some(dep) => self.complete(dep, structs, state)?,
                    None => {
                        return Err(Error::TypeError {
                            message: format!("field {} has incomplete type {}", name, ty),
                            span: *span,
                        })
                    }
                }
            }
            laid_out.push((name.clone(), field_ty));
        }

        let ir_fields = laid_out.iter().map(|&(_, ty)| self.registry.ir_type(ty)).collect();
        self.registry.complete_struct(id, laid_out);
        self.builder
            .add_struct(self.registry.name(id), ir_fields, self.registry.size_of(id));
        state.insert(id, Layout::Done);
        Ok(())
    }

    fn register_method(&mut self, method: NodeId, owner: TypeId, prefix: &str) -> Result<()> {
        let NodeKind::FuncDecl { name, params, ret, .. } = self.ast.kind(method) else {
            unreachable!("struct methods are function declarations");
        };
        let span = self.ast.span(method);
        if self.registry.as_struct(owner).and_then(|st| st.method(name)).is_some() {
            return Err(Error::DuplicateVariable { name: name.clone(), span });
        }

        let mut param_types = vec![self.registry.pointer_to(owner)];
        param_types.extend(self.resolve_params(params)?);
        let ty = self.signature(param_types, ret.as_ref())?;
        let symbol = self.declare(&format!("{}.{}", prefix, name), ty);

        self.registry.add_method(owner, name, ty, &symbol);
        debug!("registered method {}: {}", symbol, self.registry.name(ty));
        self.signatures.insert(method, FunctionSig { symbol, ty, receiver: Some(owner) });
        Ok(())
    }

    fn resolve_params(&mut self, params: &[Param]) -> Result<Vec<TypeId>> {
        params.iter().map(|p| self.registry.resolve(&p.ty)).collect()
    }

    fn signature(&mut self, params: Vec<TypeId>, ret: Option<&TypeExpr>) -> Result<TypeId> {
        let ret = ret.map(|r| self.registry.resolve(r)).transpose()?;
        Ok(self.registry.function_type(params, ret))
    }

    /// Declare the IR function for `ty` and return its unique symbol
    fn declare(&mut self, name: &str, ty: TypeId) -> String {
        let (params, ret, sret) = self.registry.ir_signature(ty);
        self.builder.declare_function(name, params, ret, sret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_source;
    use crate::middle::ir::IRType;

    struct Fixture {
        registry: TypeRegistry,
        builder: IRBuilder,
        scopes: ScopeTree,
        signatures: HashMap<NodeId, FunctionSig>,
    }

    fn scan(source: &str) -> Result<Fixture> {
        let ast = parse_source(source, 0)?;
        let NodeKind::Program { body } = ast.kind(ast.root().unwrap()) else { panic!() };
        let mut fx = Fixture {
            registry: TypeRegistry::new(),
            builder: IRBuilder::new("m"),
            scopes: ScopeTree::new(),
            signatures: HashMap::new(),
        };
        TypeScanner::new(&ast, &mut fx.registry, &mut fx.builder, &mut fx.scopes, &mut fx.signatures)
            .scan(ast.stmts(*body), "m")?;
        Ok(fx)
    }

    #[test]
    fn test_forward_references() {
        let fx = scan(
            "func area(r: Rect) -> i32 { return r.w * r.h; }
             struct Rect { origin: Point; w: i32; h: i32; }
             struct Point { x: i32; y: i32; }",
        )
        .unwrap();
        let rect = fx.registry.lookup("Rect").unwrap();
        assert_eq!(fx.registry.size_of(rect), 16);
        let st = fx.registry.as_struct(rect).unwrap();
        assert_eq!(st.field("w").unwrap().offset, 8);

        // Point was laid out before Rect needed it
        let names: Vec<_> = fx.builder.module().structs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Point", "Rect"]);

        let area = fx.scopes.lookup("area").unwrap();
        assert_eq!(area.value(), &Value::Function("m.area".to_string()));
        assert!(!area.is_writable());
        let func = fx.builder.module().function("m.area").unwrap();
        assert_eq!(func.params, vec![IRType::ptr(IRType::Struct("Rect".to_string()))]);
    }

    #[test]
    fn test_self_referential_pointer_is_fine() {
        let fx = scan("struct Node { value: i32; next: Node*; }").unwrap();
        let node = fx.registry.lookup("Node").unwrap();
        assert_eq!(fx.registry.size_of(node), 16);
    }

    #[test]
    fn test_recursive_struct() {
        let err = scan("struct A { b: B; } struct B { a: A; }").err().unwrap();
        assert!(matches!(err, Error::TypeError { ref message, .. } if message.starts_with("recursive struct")));
    }

    #[test]
    fn test_methods_take_receiver_pointer() {
        let fx = scan("struct Counter { n: i32; func bump(by: i32) -> i32 { return self.n + by; } }").unwrap();
        let counter = fx.registry.lookup("Counter").unwrap();
        let method = fx.registry.as_struct(counter).unwrap().method("bump").unwrap().clone();
        assert_eq!(method.symbol, "m.Counter.bump");

        let func = fx.registry.as_function(method.func).unwrap();
        assert_eq!(fx.registry.pointee(func.params[0]), Some(counter));
        assert_eq!(func.params[1], fx.registry.builtins().i32);
        assert!(fx.signatures.values().any(|s| s.receiver == Some(counter)));
    }

    #[test]
    fn test_duplicates() {
        assert!(matches!(
            scan("struct P { x: i32; } struct P { y: i32; }").err().unwrap(),
            Error::DuplicateType { .. }
        ));
        assert!(matches!(
            scan("func f() { } func f() { }").err().unwrap(),
            Error::DuplicateVariable { .. }
        ));
        assert!(matches!(
            scan("struct P { x: i32; x: i32; }").err().unwrap(),
            Error::DuplicateVariable { .. }
        ));
    }

    #[test]
    fn test_unknown_type_in_signature() {
        let err = scan("func f(x: Missing) { }").err().unwrap();
        assert!(matches!(err, Error::UnknownType { ref name, .. } if name == "Missing"));
    }
}
