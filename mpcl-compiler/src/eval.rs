//! Best-effort constant evaluation over the AST.
//!
//! Folding is mandatory for loop headers, array indices, slice bounds,
//! and constant definitions; elsewhere it is an optimization. The
//! evaluator returns `Ok(None)` when an expression is not a compile-time
//! constant and an error only for hard failures such as constant
//! division by zero.

use crate::ast::{BinaryOp, Expr, Stmt, UnaryOp, Unit};
use crate::builtins;
use crate::error::CompileError;
use crate::ssa::{Bindings, ConstValue, Value};

pub struct EvalCtx<'a> {
    pub source: &'a str,
    pub unit: &'a Unit,
    pub bindings: &'a mut Bindings,
}

impl<'a> EvalCtx<'a> {
    fn err(&self, expr: &Expr, message: String) -> CompileError {
        CompileError::not_constant(self.source, expr.location(), message)
    }
}

/// Evaluate a loop init/increment statement. Returns `false` when the
/// statement does not fold.
pub fn eval_stmt(stmt: &Stmt, ctx: &mut EvalCtx) -> Result<bool, CompileError> {
    match stmt {
        Stmt::Assign {
            lvalues,
            op,
            exprs,
            define,
            loc,
        } => {
            if lvalues.len() != 1 || exprs.len() != 1 {
                return Ok(false);
            }
            let name = match &lvalues[0] {
                Expr::NameRef { name, .. } if name.package.is_none() => name.name.clone(),
                _ => return Ok(false),
            };
            let rhs = match eval_expr(&exprs[0], ctx)? {
                Some(v) => v,
                None => return Ok(false),
            };
            let value = match op {
                None => rhs,
                Some(op) => {
                    let old = match ctx.bindings.get(&name).and_then(|v| v.konst.clone()) {
                        Some(v) => v,
                        None => return Ok(false),
                    };
                    match fold_binary(*op, &old, &rhs) {
                        Some(v) => v,
                        None => {
                            return Err(CompileError::not_constant(
                                ctx.source,
                                *loc,
                                format!("invalid operation {} on constants", op),
                            ))
                        }
                    }
                }
            };
            if !*define && !ctx.bindings.contains_key(&name) {
                return Ok(false);
            }
            ctx.bindings.insert(name, Value::constant(value));
            Ok(true)
        }
        _ => Ok(false),
    }
}

pub fn eval_expr(expr: &Expr, ctx: &mut EvalCtx) -> Result<Option<ConstValue>, CompileError> {
    match expr {
        Expr::IntLit { value, .. } => Ok(Some(ConstValue::Int(*value))),
        Expr::BoolLit { value, .. } => Ok(Some(ConstValue::Bool(*value))),
        Expr::StringLit { value, .. } => Ok(Some(ConstValue::Str(value.clone()))),
        Expr::NameRef { name, .. } => {
            if name.package.is_some() {
                // Qualified constants resolve against the builtin table.
                return Ok(None);
            }
            if let Some(value) = ctx.bindings.get(&name.name) {
                return Ok(value.konst.clone());
            }
            // Package-level constants.
            let init = ctx
                .unit
                .constants
                .iter()
                .find(|(n, _)| *n == name.name)
                .map(|(_, e)| e.clone());
            match init {
                Some(init) => eval_expr(&init, ctx),
                None => Ok(None),
            }
        }
        Expr::Binary {
            op, left, right, ..
        } => {
            let l = match eval_expr(left, ctx)? {
                Some(v) => v,
                None => return Ok(None),
            };
            let r = match eval_expr(right, ctx)? {
                Some(v) => v,
                None => return Ok(None),
            };
            if matches!(op, BinaryOp::Div | BinaryOp::Mod) {
                if let ConstValue::Int(0) = r {
                    return Err(ctx.err(expr, "integer divide by zero".to_string()));
                }
            }
            match fold_binary(*op, &l, &r) {
                Some(v) => Ok(Some(v)),
                None => Err(ctx.err(
                    expr,
                    format!("invalid operation: {} {} {}", left, op, right),
                )),
            }
        }
        Expr::Unary { op, expr: sub, .. } => match eval_expr(sub, ctx)? {
            Some(ConstValue::Int(v)) if *op == UnaryOp::Minus => {
                Ok(Some(ConstValue::Int(v.wrapping_neg())))
            }
            Some(ConstValue::Bool(v)) if *op == UnaryOp::Not => Ok(Some(ConstValue::Bool(!v))),
            Some(_) => Err(ctx.err(expr, "invalid operand".to_string())),
            None => Ok(None),
        },
        Expr::Index {
            expr: base, index, ..
        } => {
            let base_v = match eval_expr(base, ctx)? {
                Some(v) => v,
                None => return Ok(None),
            };
            let idx = match eval_expr(index, ctx)? {
                Some(ConstValue::Int(v)) => v,
                Some(_) => return Err(ctx.err(index, "invalid index".to_string())),
                None => return Ok(None),
            };
            match base_v {
                ConstValue::Str(s) => match s.as_bytes().get(idx as usize) {
                    Some(byte) => Ok(Some(ConstValue::Int(*byte as i64))),
                    None => Err(ctx.err(
                        expr,
                        format!("index out of range [{}] with length {}", idx, s.len()),
                    )),
                },
                ConstValue::Array(values) => match values.get(idx as usize) {
                    Some(v) => Ok(Some(v.clone())),
                    None => Err(ctx.err(
                        expr,
                        format!("index out of range [{}] with length {}", idx, values.len()),
                    )),
                },
                _ => Ok(None),
            }
        }
        Expr::Slice {
            expr: base,
            from,
            to,
            ..
        } => {
            let base_v = match eval_expr(base, ctx)? {
                Some(ConstValue::Str(s)) => s,
                _ => return Ok(None),
            };
            let from_v = match from {
                Some(e) => match eval_expr(e, ctx)? {
                    Some(ConstValue::Int(v)) => v as usize,
                    _ => return Ok(None),
                },
                None => 0,
            };
            let to_v = match to {
                Some(e) => match eval_expr(e, ctx)? {
                    Some(ConstValue::Int(v)) => v as usize,
                    _ => return Ok(None),
                },
                None => base_v.len(),
            };
            if from_v > to_v || to_v > base_v.len() {
                return Err(ctx.err(
                    expr,
                    format!("slice bounds out of range [{}:{}]", from_v, to_v),
                ));
            }
            Ok(Some(ConstValue::Str(base_v[from_v..to_v].to_string())))
        }
        Expr::Call { name, args, .. } => {
            match builtins::find(name.package.as_deref(), &name.name) {
                Some(builtin) => match builtin.fold {
                    Some(fold) => fold(args, ctx),
                    None => Ok(None),
                },
                None => Ok(None),
            }
        }
        Expr::Conversion {
            type_info,
            expr: sub,
            ..
        } => match eval_expr(sub, ctx)? {
            Some(ConstValue::Int(v)) => {
                let bits = type_info.bits;
                if bits == 0 || bits >= 64 {
                    return Ok(Some(ConstValue::Int(v)));
                }
                let mask = (1i64 << bits) - 1;
                let masked = v & mask;
                let value = if type_info.kind == mpcl_circuit::Kind::Int
                    && masked >> (bits - 1) & 1 == 1
                {
                    masked | !mask
                } else {
                    masked
                };
                Ok(Some(ConstValue::Int(value)))
            }
            Some(v) => Ok(Some(v)),
            None => Ok(None),
        },
        Expr::Composite { values, .. } => {
            let mut folded = Vec::with_capacity(values.len());
            for (_, value) in values {
                match eval_expr(value, ctx)? {
                    Some(v) => folded.push(v),
                    None => return Ok(None),
                }
            }
            Ok(Some(ConstValue::Array(folded)))
        }
        _ => Ok(None),
    }
}

pub fn fold_binary(op: BinaryOp, l: &ConstValue, r: &ConstValue) -> Option<ConstValue> {
    use ConstValue::*;
    Some(match (l, r) {
        (Int(l), Int(r)) => match op {
            BinaryOp::Mul => Int(l.wrapping_mul(*r)),
            BinaryOp::Div => Int(l.wrapping_div(*r)),
            BinaryOp::Mod => Int(l.wrapping_rem(*r)),
            BinaryOp::Lshift => Int(if *r >= 64 { 0 } else { l.wrapping_shl(*r as u32) }),
            BinaryOp::Rshift => Int(if *r >= 64 { 0 } else { l.wrapping_shr(*r as u32) }),
            BinaryOp::Band => Int(l & r),
            BinaryOp::Bclear => Int(l & !r),
            BinaryOp::Add => Int(l.wrapping_add(*r)),
            BinaryOp::Sub => Int(l.wrapping_sub(*r)),
            BinaryOp::Bor => Int(l | r),
            BinaryOp::Bxor => Int(l ^ r),
            BinaryOp::Eq => Bool(l == r),
            BinaryOp::Neq => Bool(l != r),
            BinaryOp::Lt => Bool(l < r),
            BinaryOp::Le => Bool(l <= r),
            BinaryOp::Gt => Bool(l > r),
            BinaryOp::Ge => Bool(l >= r),
            BinaryOp::And | BinaryOp::Or => return None,
        },
        (Bool(l), Bool(r)) => match op {
            BinaryOp::And => Bool(*l && *r),
            BinaryOp::Or => Bool(*l || *r),
            BinaryOp::Eq => Bool(l == r),
            BinaryOp::Neq => Bool(l != r),
            _ => return None,
        },
        (Str(l), Str(r)) => match op {
            BinaryOp::Add => Str(format!("{}{}", l, r)),
            BinaryOp::Eq => Bool(l == r),
            BinaryOp::Neq => Bool(l != r),
            _ => return None,
        },
        _ => return None,
    })
}
