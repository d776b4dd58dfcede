//! Expression lowering

use log::trace;

use crate::codegen::Compiler;
use crate::frontend::ast::{BinaryOp, Constant, NodeId, NodeKind};
use crate::middle::ir::{self, IRType, Value};
use crate::types::{ops, Object};
use crate::utils::{Error, Result};

impl<'a> Compiler<'a> {
    pub(crate) fn compile_expr(&mut self, node: NodeId) -> Result<Object> {
        self.compile_expr_into(node, None)
    }

    /// Compile an expression whose value will be stored in `dest`. A call
    /// returning a struct of the same type writes its result there directly.
    pub(crate) fn compile_expr_into(&mut self, node: NodeId, dest: Option<&Object>) -> Result<Object> {
        let span = self.ast.span(node);
        match self.ast.kind(node) {
            NodeKind::Const { value } => Ok(self.compile_constant(value)),
            NodeKind::Ident { name } => match self.scopes.lookup(name) {
                Some(object) => Ok(object.clone()),
                None => Err(Error::UnresolvedIdentifier { name: name.clone(), span }),
            },
            NodeKind::Assign { left, right } => {
                let value = self.compile_expr(*right)?;
                let target = self.compile_expr(*left)?;
                target
                    .write(&self.registry, &mut self.builder, &value)
                    .map_err(|e| e.at(span))?;
                Ok(target)
            }
            NodeKind::BinOp { op: op @ (BinaryOp::And | BinaryOp::Or), left, right } => {
                self.compile_logical(*op, *left, *right)
            }
            NodeKind::BinOp { op, left, right } => {
                let lhs = self.compile_expr(*left)?;
                let rhs = self.compile_expr(*right)?;
                ops::binary_op(&self.registry, &mut self.builder, &lhs, *op, &rhs).map_err(|e| e.at(span))
            }
            NodeKind::UnaryOp { op, operand } => {
                let operand = self.compile_expr(*operand)?;
                ops::unary_op(&mut self.registry, &mut self.builder, *op, &operand).map_err(|e| e.at(span))
            }
            NodeKind::FieldCall { .. } => match self.compile_call(node, dest)? {
                Some(result) => Ok(result),
                None => Err(Error::TypeError {
                    message: "a call without a return type has no value".to_string(),
                    span,
                }),
            },
            NodeKind::Selector { parent, field } => {
                let receiver = self.compile_expr(*parent)?;
                ops::field_select(&self.registry, &mut self.builder, &receiver, field).map_err(|e| e.at(span))
            }
            other => Err(Error::TypeError {
                message: format!("{} is not an expression", other.tag()),
                span,
            }),
        }
    }

    fn compile_constant(&mut self, value: &Constant) -> Object {
        let builtins = *self.registry.builtins();
        match value {
            Constant::Int32(n) => Object::new_register(builtins.i32, Value::Constant(ir::Constant::Int(*n as i64))),
            Constant::Float32(x) => {
                Object::new_register(builtins.f32, Value::Constant(ir::Constant::Float(*x as f64)))
            }
            Constant::Bool(b) => Object::new_register(builtins.bool, Value::Constant(ir::Constant::Bool(*b))),
            Constant::Str(text) => {
                let address = self.builder.global_string(text);
                Object::new_register(builtins.str, address).read_only_view()
            }
        }
    }

    /// Emit a call. `dest` is reused as the result slot when the callee
    /// returns a struct of its type; otherwise struct results get a fresh
    /// slot. Yields `None` for callees without a return type.
    pub(crate) fn compile_call(&mut self, node: NodeId, dest: Option<&Object>) -> Result<Option<Object>> {
        let NodeKind::FieldCall { callee, args } = self.ast.kind(node) else {
            unreachable!("compile_call on a non-call node");
        };
        let span = self.ast.span(node);

        let (callee, mut arguments) = match self.ast.kind(*callee) {
            NodeKind::Selector { parent, field } => {
                let receiver = self.compile_expr(*parent)?;
                let method = ops::method_select(&mut self.registry, &mut self.builder, &receiver, field)
                    .map_err(|e| e.at(span))?;
                match method {
                    Some((method, this)) => (method, vec![this]),
                    None => {
                        let field = ops::field_select(&self.registry, &mut self.builder, &receiver, field)
                            .map_err(|e| e.at(span))?;
                        (field, Vec::new())
                    }
                }
            }
            _ => (self.compile_expr(*callee)?, Vec::new()),
        };
        for &arg in args {
            arguments.push(self.compile_expr(arg)?);
        }

        let ret = self.registry.as_function(callee.ty()).and_then(|f| f.ret);
        let out = match ret {
            Some(ret) if self.registry.is_struct(ret) => Some(match dest {
                Some(dest) if dest.ty() == ret && dest.is_writable() => dest.clone(),
                _ => self.alloc_object(ret),
            }),
            _ => None,
        };
        trace!("call at {:?} with {} argument(s)", span, arguments.len());
        ops::call_op(&self.registry, &mut self.builder, &callee, &arguments, out.as_ref())
            .map_err(|e| e.at(span))
    }

    /// `&&` and `||` evaluate their right operand only when the left one
    /// does not decide the result
    fn compile_logical(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> Result<Object> {
        let bool_ty = self.registry.builtins().bool;
        let slot = self.alloc_object(bool_ty);
        let (rhs_label, end_label) = match op {
            BinaryOp::And => ("and.rhs", "and.end"),
            _ => ("or.rhs", "or.end"),
        };

        let lhs = self.compile_condition(left)?;
        self.builder.build_store(IRType::Bool, lhs.clone(), slot.value().clone());
        let rhs_block = self.builder.append_block(rhs_label);
        let end_block = self.builder.create_block(end_label);
        match op {
            BinaryOp::And => self.builder.build_cond_br(lhs, rhs_block, end_block),
            _ => self.builder.build_cond_br(lhs, end_block, rhs_block),
        }

        self.builder.position_at_end(rhs_block);
        let rhs = self.compile_condition(right)?;
        self.builder.build_store(IRType::Bool, rhs, slot.value().clone());
        self.builder.build_br(end_block);

        self.builder.attach_block(end_block);
        self.builder.position_at_end(end_block);
        Ok(slot.read_only_view())
    }
}
