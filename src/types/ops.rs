//! Per-type operation dispatch
//!
//! Each type kind implements only the operations that make sense for it.
//! Scalars do arithmetic and comparison, pointers compare and dereference,
//! structs select fields and methods, functions are called. Anything else is
//! a `TypeError`. Errors carry a dummy span; the caller anchors them.

use log::trace;

use crate::frontend::ast::{BinaryOp, UnaryOp};
use crate::middle::builder::IRBuilder;
use crate::middle::ir::{self, CmpPred, Value};
use crate::types::object::Object;
use crate::types::type_system::{ScalarKind, TypeKind, TypeRegistry};
use crate::utils::{Error, Result, Span};

fn unsupported(registry: &TypeRegistry, op: impl std::fmt::Display, obj: &Object) -> Error {
    Error::type_error(format!(
        "operator '{}' is not supported for type {}",
        op,
        registry.name(obj.ty())
    ))
}

// ==================== Binary ====================

pub fn binary_op(
    registry: &TypeRegistry,
    builder: &mut IRBuilder,
    left: &Object,
    op: BinaryOp,
    right: &Object,
) -> Result<Object> {
    // && and || are lowered with branches by the visitor
    if matches!(op, BinaryOp::And | BinaryOp::Or) {
        return Err(unsupported(registry, op, left));
    }
    match registry.kind(left.ty()) {
        TypeKind::Scalar(kind) => scalar_binary(registry, builder, *kind, left, op, right),
        TypeKind::Pointer(_) => pointer_binary(registry, builder, left, op, right),
        TypeKind::Struct(_) | TypeKind::Function(_) => Err(unsupported(registry, op, left)),
    }
}

fn scalar_binary(
    registry: &TypeRegistry,
    builder: &mut IRBuilder,
    kind: ScalarKind,
    left: &Object,
    op: BinaryOp,
    right: &Object,
) -> Result<Object> {
    if left.ty() != right.ty() {
        return Err(Error::mismatch(registry.name(left.ty()), registry.name(right.ty())));
    }
    let ty = registry.ir_type(left.ty());

    if op.is_comparison() {
        let pred = comparison_predicate(kind, op).ok_or_else(|| unsupported(registry, op, left))?;
        let l = left.read(registry, builder);
        let r = right.read(registry, builder);
        let value = builder.build_cmp(pred, ty, l, r);
        return Ok(Object::new_register(registry.builtins().bool, value));
    }

    let ir_op = arithmetic_op(kind, op).ok_or_else(|| unsupported(registry, op, left))?;
    let l = left.read(registry, builder);
    let r = right.read(registry, builder);
    trace!("scalar {} on {}", ir_op, ty);
    let value = builder.build_binop(ir_op, ty, l, r);
    Ok(Object::new_register(left.ty(), value))
}

fn arithmetic_op(kind: ScalarKind, op: BinaryOp) -> Option<ir::BinOp> {
    if kind == ScalarKind::Bool {
        return None;
    }
    let signed = kind.is_signed();
    let float = kind.is_float();
    Some(match op {
        BinaryOp::Add => ir::BinOp::Add,
        BinaryOp::Sub => ir::BinOp::Sub,
        BinaryOp::Mul => ir::BinOp::Mul,
        BinaryOp::Div if float => ir::BinOp::FDiv,
        BinaryOp::Div if signed => ir::BinOp::SDiv,
        BinaryOp::Div => ir::BinOp::UDiv,
        BinaryOp::Rem if float => ir::BinOp::FRem,
        BinaryOp::Rem if signed => ir::BinOp::SRem,
        BinaryOp::Rem => ir::BinOp::URem,
        _ => return None,
    })
}

fn comparison_predicate(kind: ScalarKind, op: BinaryOp) -> Option<CmpPred> {
    let float = kind.is_float();
    let signed = kind.is_signed();
    let ordered = kind != ScalarKind::Bool;
    Some(match op {
        BinaryOp::Eq if float => CmpPred::OEq,
        BinaryOp::Ne if float => CmpPred::ONe,
        BinaryOp::Eq => CmpPred::Eq,
        BinaryOp::Ne => CmpPred::Ne,
        _ if !ordered => return None,
        BinaryOp::Lt if float => CmpPred::OLt,
        BinaryOp::Le if float => CmpPred::OLe,
        BinaryOp::Gt if float => CmpPred::OGt,
        BinaryOp::Ge if float => CmpPred::OGe,
        BinaryOp::Lt if signed => CmpPred::SLt,
        BinaryOp::Le if signed => CmpPred::SLe,
        BinaryOp::Gt if signed => CmpPred::SGt,
        BinaryOp::Ge if signed => CmpPred::SGe,
        BinaryOp::Lt => CmpPred::ULt,
        BinaryOp::Le => CmpPred::ULe,
        BinaryOp::Gt => CmpPred::UGt,
        BinaryOp::Ge => CmpPred::UGe,
        _ => return None,
    })
}

fn pointer_binary(
    registry: &TypeRegistry,
    builder: &mut IRBuilder,
    left: &Object,
    op: BinaryOp,
    right: &Object,
) -> Result<Object> {
    let pred = match op {
        BinaryOp::Eq => CmpPred::Eq,
        BinaryOp::Ne => CmpPred::Ne,
        _ => return Err(unsupported(registry, op, left)),
    };
    if left.ty() != right.ty() {
        return Err(Error::mismatch(registry.name(left.ty()), registry.name(right.ty())));
    }
    let l = left.read(registry, builder);
    let r = right.read(registry, builder);
    let value = builder.build_cmp(pred, registry.ir_type(left.ty()), l, r);
    Ok(Object::new_register(registry.builtins().bool, value))
}

// ==================== Unary ====================

/// Takes `&mut` because `&x` may intern a new pointer type
pub fn unary_op(
    registry: &mut TypeRegistry,
    builder: &mut IRBuilder,
    op: UnaryOp,
    operand: &Object,
) -> Result<Object> {
    match op {
        UnaryOp::AddrOf => {
            if !operand.is_addressable() {
                return Err(Error::type_error(format!(
                    "cannot take the address of a {} value that has no storage",
                    registry.name(operand.ty())
                )));
            }
            let ptr = registry.pointer_to(operand.ty());
            Ok(Object::new_register(ptr, operand.value().clone()).read_only_view())
        }
        UnaryOp::Deref => {
            let Some(pointee) = registry.pointee(operand.ty()) else {
                return Err(unsupported(registry, op, operand));
            };
            let address = operand.read(registry, builder);
            Ok(Object::new_addressable(pointee, address))
        }
        UnaryOp::Neg | UnaryOp::Not | UnaryOp::BitNot => {
            let kind = match registry.kind(operand.ty()) {
                TypeKind::Scalar(kind) => *kind,
                _ => return Err(unsupported(registry, op, operand)),
            };
            let ir_op = match op {
                UnaryOp::Neg if kind.is_integer() || kind.is_float() => ir::UnaryOp::Neg,
                UnaryOp::Not if kind == ScalarKind::Bool => ir::UnaryOp::Not,
                UnaryOp::BitNot if kind.is_integer() => ir::UnaryOp::BitNot,
                _ => return Err(unsupported(registry, op, operand)),
            };
            let value = operand.read(registry, builder);
            let result = builder.build_unary(ir_op, registry.ir_type(operand.ty()), value);
            Ok(Object::new_register(operand.ty(), result))
        }
    }
}

// ==================== Call ====================

/// Emit a call of `callee`.
///
/// `out` is the destination slot for struct results and must be supplied
/// whenever the callee returns a struct. A pass-by-pointer callee receives it
/// as a hidden leading argument and the result *is* that slot. A small struct
/// result is stored into it. Scalars come back as a fresh register and a
/// callee without a return type yields `None`.
pub fn call_op(
    registry: &TypeRegistry,
    builder: &mut IRBuilder,
    callee: &Object,
    args: &[Object],
    out: Option<&Object>,
) -> Result<Option<Object>> {
    let Some(func) = registry.as_function(callee.ty()) else {
        return Err(Error::type_error(format!(
            "value of type {} is not callable",
            registry.name(callee.ty())
        )));
    };

    if args.len() != func.params.len() {
        return Err(Error::ArgumentMismatch {
            message: format!("expected {} arguments, got {}", func.params.len(), args.len()),
            span: Span::dummy(),
        });
    }
    for (i, (arg, &param)) in args.iter().zip(&func.params).enumerate() {
        if arg.ty() != param {
            return Err(Error::ArgumentMismatch {
                message: format!(
                    "argument {}: expected {}, got {}",
                    i + 1,
                    registry.name(param),
                    registry.name(arg.ty())
                ),
                span: Span::dummy(),
            });
        }
    }

    let symbol = match callee.read(registry, builder) {
        Value::Function(symbol) => symbol,
        _ => return Err(Error::type_error("indirect calls through a stored function value are not supported")),
    };

    let (_, ret_ir, _) = registry.ir_signature(callee.ty());
    let mut ir_args = Vec::with_capacity(args.len() + 1);
    if func.returns_by_pointer {
        let Some(out) = out else {
            panic!("call to {} returns by pointer but no destination slot was given", symbol);
        };
        ir_args.push(out.value().clone());
    }
    for arg in args {
        ir_args.push(arg.read(registry, builder));
    }

    trace!("call {} with {} argument(s)", symbol, ir_args.len());
    let result = builder.build_call(&symbol, ir_args, ret_ir.clone());

    match (func.ret, result) {
        (None, _) => Ok(None),
        (Some(_), None) => {
            let Some(out) = out else {
                panic!("call to {} returns a struct but no destination slot was given", symbol);
            };
            Ok(Some(out.clone()))
        }
        (Some(ret), Some(value)) if registry.is_struct(ret) => {
            let Some(out) = out else {
                panic!("call to {} returns a struct but no destination slot was given", symbol);
            };
            builder.build_store(ret_ir, value, out.value().clone());
            Ok(Some(out.clone()))
        }
        (Some(ret), Some(value)) => Ok(Some(Object::new_register(ret, value))),
    }
}

// ==================== Field Select ====================

/// Address of a named field. A pointer to a struct is dereferenced implicitly.
pub fn field_select(
    registry: &TypeRegistry,
    builder: &mut IRBuilder,
    receiver: &Object,
    name: &str,
) -> Result<Object> {
    let base = struct_receiver(registry, builder, receiver)?;
    let Some(st) = registry.as_struct(base.ty()) else {
        unreachable!("struct_receiver returned a non-struct");
    };
    let Some(field) = st.field(name) else {
        return Err(Error::UnknownField {
            field: name.to_string(),
            ty: registry.name(base.ty()).to_string(),
            span: Span::dummy(),
        });
    };

    let address = builder.build_struct_gep(registry.name(base.ty()), base.value().clone(), field.index);
    let object = Object::new_addressable(field.ty, address);
    if base.is_writable() {
        Ok(object)
    } else {
        Ok(object.read_only_view())
    }
}

/// Resolve `receiver.name` as a method. Yields the callee and the receiver
/// pointer to pass as its first argument, or `None` when there is no such
/// method.
pub fn method_select(
    registry: &mut TypeRegistry,
    builder: &mut IRBuilder,
    receiver: &Object,
    name: &str,
) -> Result<Option<(Object, Object)>> {
    let struct_ty = match registry.kind(receiver.ty()) {
        TypeKind::Struct(_) => receiver.ty(),
        TypeKind::Pointer(inner) if registry.is_struct(*inner) => *inner,
        _ => return Ok(None),
    };
    let Some(method) = registry.as_struct(struct_ty).and_then(|st| st.method(name)).cloned() else {
        return Ok(None);
    };

    let base = struct_receiver(registry, builder, receiver)?;
    let ptr_ty = registry.pointer_to(struct_ty);
    let this = Object::new_register(ptr_ty, base.value().clone());
    let callee = Object::new_register(method.func, Value::Function(method.symbol)).read_only_view();
    Ok(Some((callee, this)))
}

/// The struct object behind `receiver`, dereferencing one pointer layer
fn struct_receiver(registry: &TypeRegistry, builder: &mut IRBuilder, receiver: &Object) -> Result<Object> {
    match registry.kind(receiver.ty()) {
        TypeKind::Struct(_) => Ok(receiver.clone()),
        TypeKind::Pointer(inner) if registry.is_struct(*inner) => {
            let address = receiver.read(registry, builder);
            Ok(Object::new_addressable(*inner, address))
        }
        _ => Err(Error::type_error(format!(
            "type {} has no fields",
            registry.name(receiver.ty())
        ))),
    }
}
