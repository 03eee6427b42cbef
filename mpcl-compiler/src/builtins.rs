//! Compiler-known functions.
//!
//! Each entry is keyed by `(package, name)` and supplies a constant
//! folder, an SSA emitter, or both.

use mpcl_circuit::Kind;

use crate::ast::Expr;
use crate::error::CompileError;
use crate::eval::{eval_expr, EvalCtx};
use crate::ssa::{BlockId, ConstValue, Generator, Instr, Value};
use crate::ssagen::Codegen;

pub type FoldFn = fn(&[Expr], &mut EvalCtx) -> Result<Option<ConstValue>, CompileError>;
pub type SsaFn = fn(
    &mut Codegen,
    &mut Generator,
    BlockId,
    &[Expr],
) -> Result<(BlockId, Vec<Value>), CompileError>;

pub struct Builtin {
    pub package: Option<&'static str>,
    pub name: &'static str,
    pub fold: Option<FoldFn>,
    pub ssa: Option<SsaFn>,
}

static BUILTINS: &[Builtin] = &[
    Builtin {
        package: None,
        name: "len",
        fold: Some(fold_len),
        ssa: None,
    },
    Builtin {
        package: None,
        name: "size",
        fold: Some(fold_size),
        ssa: None,
    },
    Builtin {
        package: None,
        name: "copy",
        fold: None,
        ssa: Some(ssa_copy),
    },
];

pub fn find(package: Option<&str>, name: &str) -> Option<&'static Builtin> {
    BUILTINS
        .iter()
        .find(|b| b.package == package && b.name == name)
}

/// The type of an argument expression, when statically known.
fn arg_type(expr: &Expr, ctx: &mut EvalCtx) -> Option<mpcl_circuit::TypeInfo> {
    match expr {
        Expr::NameRef { name, .. } if name.package.is_none() => ctx
            .bindings
            .get(&name.name)
            .map(|value| value.type_info.clone()),
        _ => None,
    }
}

/// `len(x)`: element count of an array, byte count of a string.
fn fold_len(args: &[Expr], ctx: &mut EvalCtx) -> Result<Option<ConstValue>, CompileError> {
    if args.len() != 1 {
        return Err(CompileError::semantic(
            ctx.source,
            args.first().map(|a| a.location()).unwrap_or_default(),
            format!("len takes 1 argument, got {}", args.len()),
        ));
    }
    if let Some(value) = eval_expr(&args[0], ctx)? {
        return Ok(Some(ConstValue::Int(match value {
            ConstValue::Str(s) => s.len() as i64,
            ConstValue::Array(values) => values.len() as i64,
            _ => {
                return Err(CompileError::semantic(
                    ctx.source,
                    args[0].location(),
                    format!("invalid argument for len: {}", args[0]),
                ))
            }
        })));
    }
    match arg_type(&args[0], ctx) {
        Some(t) if t.kind == Kind::Array => Ok(Some(ConstValue::Int(t.array_size as i64))),
        Some(t) if t.kind == Kind::String => Ok(Some(ConstValue::Int(t.bits as i64 / 8))),
        _ => Ok(None),
    }
}

/// `size(x)`: width of a value in bits.
fn fold_size(args: &[Expr], ctx: &mut EvalCtx) -> Result<Option<ConstValue>, CompileError> {
    if args.len() != 1 {
        return Err(CompileError::semantic(
            ctx.source,
            args.first().map(|a| a.location()).unwrap_or_default(),
            format!("size takes 1 argument, got {}", args.len()),
        ));
    }
    match arg_type(&args[0], ctx) {
        Some(t) if t.bits > 0 => Ok(Some(ConstValue::Int(t.bits as i64))),
        _ => match eval_expr(&args[0], ctx)? {
            Some(v) => Ok(Some(ConstValue::Int(v.min_bits() as i64))),
            None => Ok(None),
        },
    }
}

/// `copy(dst, src)`: copy elements into the array bound to `dst`,
/// returning the number of elements copied.
fn ssa_copy(
    cg: &mut Codegen,
    gen: &mut Generator,
    block: BlockId,
    args: &[Expr],
) -> Result<(BlockId, Vec<Value>), CompileError> {
    if args.len() != 2 {
        return Err(cg.semantic_err(
            args.first().map(|a| a.location()).unwrap_or_default(),
            format!("copy takes 2 arguments, got {}", args.len()),
        ));
    }
    let dst_name = match &args[0] {
        Expr::NameRef { name, .. } if name.package.is_none() => name.name.clone(),
        other => {
            return Err(cg.semantic_err(
                other.location(),
                format!("cannot copy into {}", other),
            ))
        }
    };
    let loc = args[0].location();
    let dst = cg.lookup(gen, block, &dst_name, loc)?;
    if dst.type_info.kind != Kind::Array {
        return Err(cg.semantic_err(loc, format!("cannot copy into {}", dst.type_info)));
    }
    let (block, src) = cg.expr_ssa_single(gen, block, &args[1])?;
    let element_bits = dst
        .type_info
        .element
        .as_deref()
        .map(|e| e.bits)
        .unwrap_or(8);
    let dst_elements = dst.type_info.array_size;
    let src_elements = match src.type_info.kind {
        Kind::Array => src.type_info.array_size,
        Kind::String => src.type_info.bits / 8,
        _ => {
            return Err(cg.semantic_err(
                args[1].location(),
                format!("cannot copy from {}", src.type_info),
            ))
        }
    };
    let n = dst_elements.min(src_elements);
    let new_dst = gen.new_value(&dst_name, dst.type_info.clone());
    gen.add_instr(
        block,
        Instr::Amov {
            value: src,
            array: dst,
            from: 0,
            to: n * element_bits,
            dst: new_dst.clone(),
        },
    );
    gen.blocks[block]
        .bindings
        .insert(dst_name, new_dst);
    Ok((block, vec![Value::constant(ConstValue::Int(n as i64))]))
}
