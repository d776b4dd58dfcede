//! Statement lowering

use log::{trace, warn};

use crate::codegen::Compiler;
use crate::frontend::ast::{NodeId, NodeKind};
use crate::middle::ir::{BlockId, Value};
use crate::utils::{Error, Result, Span};

impl<'a> Compiler<'a> {
    /// Compile statements in order. Once the path has returned only
    /// declarations are still compiled; the scanner already registered them
    /// and calls may refer to them.
    pub(crate) fn compile_stmts(&mut self, stmts: &[NodeId]) -> Result<()> {
        let mut skipped = 0;
        for &stmt in stmts {
            if self.scopes.has_returned() {
                let is_decl = matches!(
                    self.ast.kind(stmt),
                    NodeKind::FuncDecl { .. } | NodeKind::StructDecl { .. }
                );
                if !is_decl {
                    skipped += 1;
                    continue;
                }
            }
            self.compile_stmt(stmt)?;
        }
        if skipped > 0 {
            warn!(
                "{}: skipping {} unreachable statement(s) after return",
                self.scopes.function().symbol,
                skipped
            );
        }
        Ok(())
    }

    fn compile_stmt(&mut self, node: NodeId) -> Result<()> {
        let span = self.ast.span(node);
        trace!("stmt {} {}", node, self.ast.kind(node).tag());
        match self.ast.kind(node) {
            NodeKind::Program { .. } => {
                Err(Error::type_error("a program cannot be nested in a statement").at(span))
            }
            NodeKind::StatList { .. } => {
                self.scopes.enter_local();
                let result = self.compile_block(node);
                let returned = self.scopes.has_returned();
                self.scopes.exit();
                if returned {
                    self.scopes.mark_returned();
                }
                result
            }
            // Layout and signatures were registered by the scanner; only the
            // method bodies are left
            NodeKind::StructDecl { methods, .. } => {
                for &method in methods {
                    self.compile_function(method)?;
                }
                Ok(())
            }
            NodeKind::FuncDecl { .. } => self.compile_function(node),
            NodeKind::VarDecl { name, ty, init } => {
                let slot = match (ty, init) {
                    (None, None) => {
                        return Err(Error::UninferableVariable { name: name.clone(), span });
                    }
                    (Some(ty), init) => {
                        let ty = self.registry.resolve(ty)?;
                        let slot = self.alloc_object(ty);
                        if let Some(init) = init {
                            let value = self.compile_expr_into(*init, Some(&slot))?;
                            // A struct call result may already live in the slot
                            if value.value() != slot.value() {
                                slot.write(&self.registry, &mut self.builder, &value)
                                    .map_err(|e| e.at(span))?;
                            }
                        }
                        slot
                    }
                    (None, Some(init)) => {
                        let value = self.compile_expr(*init)?;
                        let slot = self.alloc_object(value.ty());
                        slot.write(&self.registry, &mut self.builder, &value)
                            .map_err(|e| e.at(span))?;
                        slot
                    }
                };
                trace!("var {}: {}", name, self.registry.name(slot.ty()));
                self.scopes.declare(name, slot).map_err(|e| e.at(span))
            }
            NodeKind::Return { value } => self.compile_return(*value, span),
            NodeKind::If { cond, then_body, else_body } => {
                self.compile_if(*cond, *then_body, *else_body)
            }
            NodeKind::Loop { cond, body } => self.compile_loop(*cond, *body),
            NodeKind::FieldCall { .. } => {
                // The result of a statement-level call is discarded; void is fine
                self.compile_call(node, None)?;
                Ok(())
            }
            NodeKind::Const { .. }
            | NodeKind::Ident { .. }
            | NodeKind::Assign { .. }
            | NodeKind::BinOp { .. }
            | NodeKind::UnaryOp { .. }
            | NodeKind::Selector { .. } => {
                self.compile_expr(node)?;
                Ok(())
            }
        }
    }

    fn compile_return(&mut self, value: Option<NodeId>, span: Span) -> Result<()> {
        let slot = self.scopes.return_value().cloned();
        match (value, slot) {
            (Some(value), Some(slot)) => {
                let result = self.compile_expr_into(value, Some(&slot))?;
                if result.value() != slot.value() {
                    slot.write(&self.registry, &mut self.builder, &result)
                        .map_err(|e| e.at(span))?;
                }
            }
            (Some(_), None) => {
                return Err(Error::ReturnMismatch {
                    message: format!("{} does not return a value", self.scopes.function().symbol),
                    span,
                });
            }
            (None, Some(_)) => {
                return Err(Error::ReturnMismatch {
                    message: format!("{} must return a value", self.scopes.function().symbol),
                    span,
                });
            }
            (None, None) => {}
        }

        self.scopes.mark_returned();
        match self.scopes.return_block() {
            Some(block) => self.builder.build_br(block),
            None => self.emit_epilogue(),
        }
        Ok(())
    }

    fn compile_if(&mut self, cond: NodeId, then_body: NodeId, else_body: Option<NodeId>) -> Result<()> {
        let cond = self.compile_condition(cond)?;
        let then_block = self.builder.append_block("then");
        let else_block = else_body.map(|_| self.builder.create_block("else"));
        let end_block = self.builder.create_block("endif");
        self.builder.build_cond_br(cond, then_block, else_block.unwrap_or(end_block));

        self.builder.position_at_end(then_block);
        let then_returned = self.compile_branch(then_body, end_block)?;

        let else_returned = match (else_body, else_block) {
            (Some(body), Some(block)) => {
                self.builder.attach_block(block);
                self.builder.position_at_end(block);
                self.compile_branch(body, end_block)?
            }
            _ => false,
        };

        if then_returned && else_returned {
            // Nothing reaches the post-if block
            self.scopes.mark_returned();
        } else {
            self.builder.attach_block(end_block);
            self.builder.position_at_end(end_block);
        }
        Ok(())
    }

    /// Compile one branch in its own scope; falls through to `end` unless it
    /// returned. Yields whether it returned.
    fn compile_branch(&mut self, body: NodeId, end: BlockId) -> Result<bool> {
        self.scopes.enter_local();
        let result = self.compile_block(body);
        let returned = self.scopes.has_returned();
        if result.is_ok() && !returned {
            self.builder.build_br(end);
        }
        self.scopes.exit();
        result.map(|_| returned)
    }

    fn compile_loop(&mut self, cond: NodeId, body: NodeId) -> Result<()> {
        let cond_block = self.builder.append_block("loop.cond");
        self.builder.build_br(cond_block);
        self.builder.position_at_end(cond_block);
        let guard = self.compile_condition(cond)?;

        let body_block = self.builder.append_block("loop.body");
        let end_block = self.builder.create_block("loop.end");
        self.builder.build_cond_br(guard, body_block, end_block);

        // A return in the body does not make the loop return; the guard may
        // fail before the body ever runs
        self.builder.position_at_end(body_block);
        self.compile_branch(body, cond_block)?;

        self.builder.attach_block(end_block);
        self.builder.position_at_end(end_block);
        Ok(())
    }

    /// Evaluate a guard, which must be `bool`
    pub(crate) fn compile_condition(&mut self, cond: NodeId) -> Result<Value> {
        let object = self.compile_expr(cond)?;
        let bool_ty = self.registry.builtins().bool;
        if object.ty() != bool_ty {
            return Err(Error::TypeMismatch {
                expected: "bool".to_string(),
                got: self.registry.name(object.ty()).to_string(),
                span: self.ast.span(cond),
            });
        }
        Ok(object.read(&self.registry, &mut self.builder))
    }
}
