//! AST to SSA lowering.
//!
//! If/else always compiles through phi merges; for-loops unroll under
//! the loop cap; calls inline at their call sites with recursion
//! rejected; the `int`/`uint` placeholder width specializes to the
//! caller's width.

use mpcl_circuit::{Kind, TypeInfo};

use crate::ast::{BinaryOp, Expr, Func, List, Stmt, UnaryOp, Unit};
use crate::builtins;
use crate::error::{CompileError, Point};
use crate::eval::{eval_expr, eval_stmt, EvalCtx};
use crate::ssa::{BlockId, ConstValue, Generator, Instr, Program, Value};
use crate::Params;

struct Frame {
    start: BlockId,
    ret: BlockId,
    func: Func,
}

fn ret_name(index: usize) -> String {
    format!("%ret{}", index)
}

pub struct Codegen<'a> {
    source: String,
    unit: &'a Unit,
    params: &'a Params,
    frames: Vec<Frame>,
    call_stack: Vec<String>,
}

/// Lower the unit's `main` function into an SSA program.
pub fn generate(
    source: &str,
    unit: &Unit,
    params: &Params,
) -> Result<Program, CompileError> {
    let mut cg = Codegen {
        source: source.to_string(),
        unit,
        params,
        frames: Vec::new(),
        call_stack: Vec::new(),
    };
    let mut gen = Generator::new();

    let main = unit
        .function("main")
        .ok_or_else(|| {
            CompileError::semantic(source, Point::default(), "no main function".to_string())
        })?
        .clone();

    let entry = gen.block();
    let mut inputs = Vec::new();
    let mut input_types = Vec::new();
    for arg in &main.args {
        let mut type_info = arg.type_info.clone();
        if type_info.bits == 0 {
            // Placeholder widths default to 32 bits at the program
            // boundary; there is no caller to specialize them.
            type_info.bits = 32;
            type_info.min_bits = 32;
        }
        let value = gen.new_value(&arg.name, type_info.clone());
        gen.blocks[entry]
            .bindings
            .insert(arg.name.clone(), value.clone());
        inputs.push(value);
        input_types.push(type_info);
    }

    let ret = gen.block();
    cg.frames.push(Frame {
        start: entry,
        ret,
        func: main.clone(),
    });
    cg.call_stack.push("main".to_string());

    let end = cg.stmt_list(&mut gen, entry, &main.body)?;
    if !gen.blocks[end].dead {
        return Err(CompileError::semantic(
            source,
            main.loc,
            "missing return".to_string(),
        ));
    }

    let mut output_types = Vec::new();
    let mut outputs = Vec::new();
    for (idx, ret_type) in main.returns.iter().enumerate() {
        let value = gen
            .return_binding(entry, &ret_name(idx), ret)
            .ok_or_else(|| {
                CompileError::semantic(source, main.loc, "missing return".to_string())
            })?;
        output_types.push(if ret_type.bits > 0 {
            ret_type.clone()
        } else {
            value.type_info.clone()
        });
        outputs.push(value);
    }
    gen.add_instr(ret, Instr::Ret(outputs));

    Ok(Program {
        blocks: std::mem::take(&mut gen.blocks),
        inputs,
        input_types,
        output_types,
    })
}

impl<'a> Codegen<'a> {
    pub fn semantic_err(&self, point: Point, message: String) -> CompileError {
        CompileError::semantic(&self.source, point, message)
    }

    fn not_constant_err(&self, point: Point, message: String) -> CompileError {
        CompileError::not_constant(&self.source, point, message)
    }

    /// Look up a bound name in a block.
    pub fn lookup(
        &self,
        gen: &Generator,
        block: BlockId,
        name: &str,
        loc: Point,
    ) -> Result<Value, CompileError> {
        gen.blocks[block]
            .bindings
            .get(name)
            .cloned()
            .ok_or_else(|| self.semantic_err(loc, format!("undefined variable '{}'", name)))
    }

    /// Run the constant evaluator over `expr` against a block's
    /// bindings.
    fn try_fold(
        &mut self,
        gen: &mut Generator,
        block: BlockId,
        expr: &Expr,
    ) -> Result<Option<ConstValue>, CompileError> {
        let mut bindings = std::mem::take(&mut gen.blocks[block].bindings);
        let result = {
            let mut ctx = EvalCtx {
                source: &self.source,
                unit: self.unit,
                bindings: &mut bindings,
            };
            eval_expr(expr, &mut ctx)
        };
        gen.blocks[block].bindings = bindings;
        result
    }

    fn stmt_list(
        &mut self,
        gen: &mut Generator,
        mut block: BlockId,
        list: &List,
    ) -> Result<BlockId, CompileError> {
        for stmt in list {
            if gen.blocks[block].dead {
                log::warn!(
                    "{}:{}: unreachable code",
                    self.source,
                    stmt.location().line
                );
                break;
            }
            block = self.stmt_ssa(gen, block, stmt)?;
        }
        Ok(block)
    }

    fn stmt_ssa(
        &mut self,
        gen: &mut Generator,
        block: BlockId,
        stmt: &Stmt,
    ) -> Result<BlockId, CompileError> {
        match stmt {
            Stmt::VariableDef {
                loc,
                names,
                type_info,
                init,
            } => self.stmt_var(gen, block, *loc, names, type_info, init),
            Stmt::ConstantDef { loc, name, init } => {
                let value = match self.try_fold(gen, block, init)? {
                    Some(v) => v,
                    None => {
                        return Err(self.not_constant_err(
                            *loc,
                            format!("const initializer {} is not a constant", init),
                        ))
                    }
                };
                gen.blocks[block]
                    .bindings
                    .insert(name.clone(), Value::constant(value));
                Ok(block)
            }
            Stmt::Assign {
                loc,
                lvalues,
                op,
                exprs,
                define,
            } => self.stmt_assign(gen, block, *loc, lvalues, *op, exprs, *define),
            Stmt::If {
                loc: _,
                cond,
                true_branch,
                false_branch,
            } => self.stmt_if(gen, block, cond, true_branch, false_branch),
            Stmt::For {
                loc,
                init,
                cond,
                inc,
                body,
            } => self.stmt_for(gen, block, *loc, init, cond, inc, body),
            Stmt::Return { loc, exprs } => self.stmt_return(gen, block, *loc, exprs),
            Stmt::ExprStmt { expr, .. } => {
                let (block, _) = self.expr_ssa(gen, block, expr)?;
                Ok(block)
            }
        }
    }

    fn stmt_var(
        &mut self,
        gen: &mut Generator,
        mut block: BlockId,
        loc: Point,
        names: &[String],
        type_info: &TypeInfo,
        init: &Option<Expr>,
    ) -> Result<BlockId, CompileError> {
        for name in names {
            let init_value = match init {
                Some(expr) => {
                    let (next, value) = self.expr_ssa_single(gen, block, expr)?;
                    block = next;
                    value
                }
                None => {
                    let zero = match type_info.kind {
                        Kind::Bool => ConstValue::Bool(false),
                        Kind::Int | Kind::Uint | Kind::Array | Kind::Struct => ConstValue::Int(0),
                        Kind::String => ConstValue::Str(String::new()),
                        _ => {
                            return Err(self.semantic_err(
                                loc,
                                format!("unsupported variable type {}", type_info),
                            ))
                        }
                    };
                    Value::constant(zero)
                }
            };
            let lvalue = gen.new_value(name, type_info.clone());
            let init_value = self.adopt(init_value, type_info);
            if !lvalue.type_info.compatible(&init_value.type_info) {
                return Err(self.semantic_err(
                    loc,
                    format!(
                        "cannot use {} (type {}) as type {}",
                        init_value, init_value.type_info, type_info
                    ),
                ));
            }
            gen.add_instr(block, Instr::Mov(init_value, lvalue.clone()));
            gen.blocks[block].bindings.insert(name.clone(), lvalue);
        }
        Ok(block)
    }

    #[allow(clippy::too_many_arguments)]
    fn stmt_assign(
        &mut self,
        gen: &mut Generator,
        mut block: BlockId,
        loc: Point,
        lvalues: &[Expr],
        op: Option<BinaryOp>,
        exprs: &[Expr],
        define: bool,
    ) -> Result<BlockId, CompileError> {
        // Evaluate right-hand sides; a single call may fan out to
        // multiple values.
        let mut values = Vec::new();
        for expr in exprs {
            let (next, vs) = self.expr_ssa(gen, block, expr)?;
            block = next;
            if vs.is_empty() {
                return Err(self.semantic_err(
                    expr.location(),
                    format!("{} used as value", expr),
                ));
            }
            if exprs.len() > 1 && vs.len() > 1 {
                return Err(self.semantic_err(
                    expr.location(),
                    format!("multiple-value {} in single-value context", expr),
                ));
            }
            values.extend(vs);
        }
        if values.len() != lvalues.len() {
            return Err(self.semantic_err(
                loc,
                format!(
                    "assignment mismatch: {} variables but {} values",
                    lvalues.len(),
                    values.len()
                ),
            ));
        }

        for (lvalue, mut value) in lvalues.iter().zip(values.into_iter()) {
            if let Some(op) = op {
                let (next, old) = self.expr_ssa_single(gen, block, lvalue)?;
                block = next;
                let (next, result) =
                    self.binary_values(gen, block, loc, op, old, value)?;
                block = next;
                value = result;
            }
            block = self.assign_value(gen, block, loc, lvalue, value, define)?;
        }
        Ok(block)
    }

    fn assign_value(
        &mut self,
        gen: &mut Generator,
        block: BlockId,
        loc: Point,
        lvalue: &Expr,
        value: Value,
        define: bool,
    ) -> Result<BlockId, CompileError> {
        match lvalue {
            Expr::NameRef { name, .. } if name.package.is_none() => {
                let target_type = if define {
                    if gen.blocks[block].bindings.contains_key(&name.name) {
                        return Err(self.semantic_err(
                            loc,
                            "no new variables on left side of :=".to_string(),
                        ));
                    }
                    self.concrete_type(&value)
                } else {
                    let bound = self.lookup(gen, block, &name.name, loc)?;
                    if bound.is_const() {
                        return Err(self.semantic_err(
                            loc,
                            format!("cannot assign to constant '{}'", name.name),
                        ));
                    }
                    bound.type_info
                };
                let value = self.adopt(value, &target_type);
                if !target_type.compatible(&value.type_info) {
                    return Err(self.semantic_err(
                        loc,
                        format!(
                            "cannot use {} (type {}) as type {}",
                            value, value.type_info, target_type
                        ),
                    ));
                }
                let dst = gen.new_value(&name.name, target_type);
                gen.add_instr(block, Instr::Mov(value, dst.clone()));
                gen.blocks[block].bindings.insert(name.name.clone(), dst);
                Ok(block)
            }
            Expr::Index {
                expr: base, index, ..
            } => {
                let (base_name, array) = self.lvalue_base(gen, block, base, loc)?;
                if array.type_info.kind != Kind::Array {
                    return Err(self.semantic_err(
                        loc,
                        format!("cannot index {} (type {})", base, array.type_info),
                    ));
                }
                let element_bits = array
                    .type_info
                    .element
                    .as_deref()
                    .map(|e| e.bits)
                    .unwrap_or(0);
                let idx = self.fold_index(gen, block, index)?;
                if idx >= array.type_info.array_size as i64 || idx < 0 {
                    return Err(self.not_constant_err(
                        index.location(),
                        format!(
                            "index out of range [{}] with length {}",
                            idx, array.type_info.array_size
                        ),
                    ));
                }
                let from = idx as u32 * element_bits;
                let dst = gen.new_value(&base_name, array.type_info.clone());
                gen.add_instr(
                    block,
                    Instr::Amov {
                        value,
                        array,
                        from,
                        to: from + element_bits,
                        dst: dst.clone(),
                    },
                );
                gen.blocks[block].bindings.insert(base_name, dst);
                Ok(block)
            }
            Expr::Field {
                expr: base, field, ..
            } => {
                let (base_name, target) = self.lvalue_base(gen, block, base, loc)?;
                let field_info = target
                    .type_info
                    .field(field)
                    .cloned()
                    .ok_or_else(|| {
                        self.semantic_err(
                            loc,
                            format!("{} has no field '{}'", target.type_info, field),
                        )
                    })?;
                let dst = gen.new_value(&base_name, target.type_info.clone());
                gen.add_instr(
                    block,
                    Instr::Amov {
                        value,
                        array: target,
                        from: field_info.offset,
                        to: field_info.offset + field_info.type_info.bits,
                        dst: dst.clone(),
                    },
                );
                gen.blocks[block].bindings.insert(base_name, dst);
                Ok(block)
            }
            other => Err(self.semantic_err(loc, format!("cannot assign to {}", other))),
        }
    }

    /// Resolve an assignment target base to a bound name and its value.
    fn lvalue_base(
        &mut self,
        gen: &Generator,
        block: BlockId,
        base: &Expr,
        loc: Point,
    ) -> Result<(String, Value), CompileError> {
        match base {
            Expr::NameRef { name, .. } if name.package.is_none() => {
                let value = self.lookup(gen, block, &name.name, loc)?;
                Ok((name.name.clone(), value))
            }
            other => Err(self.semantic_err(loc, format!("cannot assign to {}", other))),
        }
    }

    fn fold_index(
        &mut self,
        gen: &mut Generator,
        block: BlockId,
        index: &Expr,
    ) -> Result<i64, CompileError> {
        match self.try_fold(gen, block, index)? {
            Some(ConstValue::Int(v)) => Ok(v),
            Some(_) => Err(self.not_constant_err(
                index.location(),
                format!("invalid index {}", index),
            )),
            None => Err(self.not_constant_err(
                index.location(),
                format!("index {} is not a compile-time constant", index),
            )),
        }
    }

    fn stmt_if(
        &mut self,
        gen: &mut Generator,
        block: BlockId,
        cond: &Expr,
        true_branch: &List,
        false_branch: &List,
    ) -> Result<BlockId, CompileError> {
        let (block, cond_value) = self.expr_ssa_single(gen, block, cond)?;
        if cond_value.type_info.kind != Kind::Bool
            && !(cond_value.is_const()
                && matches!(cond_value.konst, Some(ConstValue::Bool(_))))
        {
            return Err(self.semantic_err(
                cond.location(),
                format!(
                    "non-bool {} (type {}) used as if condition",
                    cond, cond_value.type_info
                ),
            ));
        }

        let branch_block = gen.next_block(block);
        gen.blocks[branch_block].branch_cond = Some(cond_value.clone());
        let block = branch_block;

        let t_block = gen.branch_block(block);
        let t_next = self.stmt_list(gen, t_block, true_branch)?;

        if false_branch.is_empty() {
            if gen.blocks[t_next].dead {
                let next = gen.next_block(block);
                return Ok(next);
            }
            let t_bindings = gen.blocks[t_next].bindings.clone();
            let parent_bindings = gen.blocks[block].bindings.clone();
            let merged =
                gen.merge_bindings(&cond_value, &t_bindings, &parent_bindings, t_next);
            gen.blocks[t_next].bindings = merged;
            gen.blocks[block].next = Some(t_next);
            return Ok(t_next);
        }

        let f_block = gen.next_block(block);
        let f_next = self.stmt_list(gen, f_block, false_branch)?;

        let t_dead = gen.blocks[t_next].dead;
        let f_dead = gen.blocks[f_next].dead;
        if t_dead && f_dead {
            let next = gen.block();
            gen.blocks[next].dead = true;
            return Ok(next);
        } else if t_dead {
            return Ok(f_next);
        } else if f_dead {
            return Ok(t_next);
        }

        let join = gen.block();
        gen.blocks[t_next].next = Some(join);
        gen.blocks[f_next].next = Some(join);
        let t_bindings = gen.blocks[t_next].bindings.clone();
        let f_bindings = gen.blocks[f_next].bindings.clone();
        let merged = gen.merge_bindings(&cond_value, &t_bindings, &f_bindings, join);
        gen.blocks[join].bindings = merged;
        Ok(join)
    }

    #[allow(clippy::too_many_arguments)]
    fn stmt_for(
        &mut self,
        gen: &mut Generator,
        mut block: BlockId,
        loc: Point,
        init: &Stmt,
        cond: &Expr,
        inc: &Stmt,
        body: &List,
    ) -> Result<BlockId, CompileError> {
        // The loop header evaluates in the constant environment backed
        // by the block bindings; the induction variable is a constant
        // binding visible to the unrolled body.
        let mut bindings = std::mem::take(&mut gen.blocks[block].bindings);
        let ok = {
            let mut ctx = EvalCtx {
                source: &self.source,
                unit: self.unit,
                bindings: &mut bindings,
            };
            eval_stmt(init, &mut ctx)?
        };
        if !ok {
            gen.blocks[block].bindings = bindings;
            return Err(self.not_constant_err(
                init.location(),
                "init statement is not a compile-time constant".to_string(),
            ));
        }

        let mut iterations = 0u32;
        loop {
            let cond_value = {
                let mut ctx = EvalCtx {
                    source: &self.source,
                    unit: self.unit,
                    bindings: &mut bindings,
                };
                eval_expr(cond, &mut ctx)?
            };
            let proceed = match cond_value {
                Some(ConstValue::Bool(v)) => v,
                Some(_) => {
                    gen.blocks[block].bindings = bindings;
                    return Err(self.semantic_err(
                        cond.location(),
                        "condition is not a boolean expression".to_string(),
                    ));
                }
                None => {
                    gen.blocks[block].bindings = bindings;
                    return Err(self.not_constant_err(
                        cond.location(),
                        format!("condition {} is not a compile-time constant", cond),
                    ));
                }
            };
            if !proceed {
                break;
            }
            iterations += 1;
            if iterations > self.params.max_loop_unroll {
                gen.blocks[block].bindings = bindings;
                return Err(CompileError::capacity(
                    &self.source,
                    loc,
                    format!(
                        "loop exceeds {} iterations",
                        self.params.max_loop_unroll
                    ),
                ));
            }

            gen.blocks[block].bindings = bindings;
            block = self.stmt_list(gen, block, body)?;
            if gen.blocks[block].dead {
                return Ok(block);
            }
            bindings = std::mem::take(&mut gen.blocks[block].bindings);

            let ok = {
                let mut ctx = EvalCtx {
                    source: &self.source,
                    unit: self.unit,
                    bindings: &mut bindings,
                };
                eval_stmt(inc, &mut ctx)?
            };
            if !ok {
                gen.blocks[block].bindings = bindings;
                return Err(self.not_constant_err(
                    inc.location(),
                    "increment statement is not a compile-time constant".to_string(),
                ));
            }
        }
        gen.blocks[block].bindings = bindings;
        Ok(block)
    }

    fn stmt_return(
        &mut self,
        gen: &mut Generator,
        mut block: BlockId,
        loc: Point,
        exprs: &[Expr],
    ) -> Result<BlockId, CompileError> {
        let frame_ret = self.frames.last().map(|f| f.ret).unwrap();
        let returns = self.frames.last().map(|f| f.func.returns.clone()).unwrap();

        let mut values = Vec::new();
        for expr in exprs {
            let (next, vs) = self.expr_ssa(gen, block, expr)?;
            block = next;
            if vs.is_empty() {
                return Err(self.semantic_err(
                    expr.location(),
                    format!("{} used as value", expr),
                ));
            }
            if exprs.len() > 1 && vs.len() > 1 {
                return Err(self.semantic_err(
                    expr.location(),
                    format!("multiple-value {} in single-value context", expr),
                ));
            }
            values.extend(vs);
        }
        if values.len() != returns.len() {
            return Err(self.semantic_err(
                loc,
                format!(
                    "wrong number of return values: got {}, want {}",
                    values.len(),
                    returns.len()
                ),
            ));
        }

        for (idx, (ret_type, value)) in returns.iter().zip(values.into_iter()).enumerate() {
            let mut type_info = ret_type.clone();
            if type_info.bits == 0 {
                type_info.bits = value.bits();
                type_info.min_bits = type_info.bits;
            }
            let value = self.adopt(value, &type_info);
            if !type_info.compatible(&value.type_info) {
                return Err(self.semantic_err(
                    loc,
                    format!(
                        "invalid value {} (type {}) for return value {}",
                        value, value.type_info, idx
                    ),
                ));
            }
            let dst = gen.new_value(&ret_name(idx), type_info);
            gen.add_instr(block, Instr::Mov(value, dst.clone()));
            gen.blocks[block].bindings.insert(ret_name(idx), dst);
        }

        gen.blocks[block].next = Some(frame_ret);
        gen.blocks[block].dead = true;
        Ok(block)
    }

    /// A concrete type for a value: constants materialize at their
    /// minimum width as 32-bit-default integers.
    fn concrete_type(&self, value: &Value) -> TypeInfo {
        if value.type_info.is_concrete() {
            return value.type_info.clone();
        }
        match &value.konst {
            Some(ConstValue::Bool(_)) => TypeInfo::bool(),
            Some(ConstValue::Str(s)) => TypeInfo::string(s.len() as u32),
            _ => TypeInfo::int(32.max(value.type_info.min_bits)),
        }
    }

    /// Give an untyped constant the width of its context.
    fn adopt(&self, mut value: Value, type_info: &TypeInfo) -> Value {
        if value.is_const() && !value.type_info.is_concrete() && type_info.is_concrete() {
            value.type_info = type_info.clone();
        }
        value
    }

    pub fn expr_ssa_single(
        &mut self,
        gen: &mut Generator,
        block: BlockId,
        expr: &Expr,
    ) -> Result<(BlockId, Value), CompileError> {
        let (block, values) = self.expr_ssa(gen, block, expr)?;
        match values.len() {
            0 => Err(self.semantic_err(
                expr.location(),
                format!("{} used as value", expr),
            )),
            1 => Ok((block, values.into_iter().next().unwrap())),
            _ => Err(self.semantic_err(
                expr.location(),
                format!("multiple-value {} in single-value context", expr),
            )),
        }
    }

    fn expr_ssa(
        &mut self,
        gen: &mut Generator,
        block: BlockId,
        expr: &Expr,
    ) -> Result<(BlockId, Vec<Value>), CompileError> {
        match expr {
            Expr::IntLit { value, .. } => {
                Ok((block, vec![Value::constant(ConstValue::Int(*value))]))
            }
            Expr::BoolLit { value, .. } => {
                Ok((block, vec![Value::constant(ConstValue::Bool(*value))]))
            }
            Expr::StringLit { value, .. } => Ok((
                block,
                vec![Value::constant(ConstValue::Str(value.clone()))],
            )),
            Expr::NameRef { loc, name } => {
                if name.package.is_some() {
                    return Err(self.semantic_err(
                        *loc,
                        format!("package '{}' not found", name.package.as_ref().unwrap()),
                    ));
                }
                if let Some(value) = gen.blocks[block].bindings.get(&name.name) {
                    return Ok((block, vec![value.clone()]));
                }
                // Package-level constant.
                if let Some(value) = self.try_fold(gen, block, expr)? {
                    return Ok((block, vec![Value::constant(value)]));
                }
                Err(self.semantic_err(
                    *loc,
                    format!("undefined variable '{}'", name),
                ))
            }
            Expr::Binary {
                loc,
                op,
                left,
                right,
            } => {
                // Constant folding first.
                if let Some(value) = self.try_fold(gen, block, expr)? {
                    log::debug!("ConstFold: {} => {}", expr, value);
                    return Ok((block, vec![Value::constant(value)]));
                }
                let (block, l) = self.expr_ssa_single(gen, block, left)?;
                let (block, r) = self.expr_ssa_single(gen, block, right)?;
                let (block, value) = self.binary_values(gen, block, *loc, *op, l, r)?;
                Ok((block, vec![value]))
            }
            Expr::Unary { loc, op, expr: sub } => {
                if let Some(value) = self.try_fold(gen, block, expr)? {
                    return Ok((block, vec![Value::constant(value)]));
                }
                let (block, value) = self.expr_ssa_single(gen, block, sub)?;
                match op {
                    UnaryOp::Minus => {
                        let zero = self.adopt(
                            Value::constant(ConstValue::Int(0)),
                            &value.type_info,
                        );
                        let (block, result) = self.binary_values(
                            gen,
                            block,
                            *loc,
                            BinaryOp::Sub,
                            zero,
                            value,
                        )?;
                        Ok((block, vec![result]))
                    }
                    UnaryOp::Not => {
                        if value.type_info.kind != Kind::Bool {
                            return Err(self.semantic_err(
                                *loc,
                                format!("invalid operand !{}", value.type_info),
                            ));
                        }
                        let dst = gen.anon(TypeInfo::bool());
                        gen.add_instr(
                            block,
                            Instr::Bxor(
                                value,
                                self.adopt(
                                    Value::constant(ConstValue::Bool(true)),
                                    &TypeInfo::bool(),
                                ),
                                dst.clone(),
                            ),
                        );
                        Ok((block, vec![dst]))
                    }
                }
            }
            Expr::Call { loc, name, args } => self.expr_call(gen, block, *loc, name, args),
            Expr::Conversion {
                loc: _,
                type_info,
                expr: sub,
            } => {
                if let Some(value) = self.try_fold(gen, block, expr)? {
                    let mut v = Value::constant(value);
                    v.type_info = type_info.clone();
                    return Ok((block, vec![v]));
                }
                let (block, value) = self.expr_ssa_single(gen, block, sub)?;
                let dst = gen.anon(type_info.clone());
                gen.add_instr(block, Instr::Mov(value, dst.clone()));
                Ok((block, vec![dst]))
            }
            Expr::Slice {
                loc,
                expr: base,
                from,
                to,
            } => {
                if let Some(value) = self.try_fold(gen, block, expr)? {
                    return Ok((block, vec![Value::constant(value)]));
                }
                let (block, value) = self.expr_ssa_single(gen, block, base)?;
                let (unit_bits, count, element) = match value.type_info.kind {
                    Kind::Array => {
                        let element = value.type_info.element.as_deref().cloned().unwrap();
                        (element.bits, value.type_info.array_size, Some(element))
                    }
                    Kind::String => (8, value.type_info.bits / 8, None),
                    Kind::Int | Kind::Uint => (1, value.type_info.bits, None),
                    _ => {
                        return Err(self.semantic_err(
                            *loc,
                            format!("cannot slice {}", value.type_info),
                        ))
                    }
                };
                let from_v = match from {
                    Some(e) => self.fold_index(gen, block, e)?,
                    None => 0,
                };
                let to_v = match to {
                    Some(e) => self.fold_index(gen, block, e)?,
                    None => count as i64,
                };
                if from_v < 0 || from_v >= to_v || to_v > count as i64 {
                    return Err(self.not_constant_err(
                        *loc,
                        format!("slice bounds out of range [{}:{}]", from_v, to_v),
                    ));
                }
                let result_type = match (&element, value.type_info.kind) {
                    (Some(element), _) => {
                        TypeInfo::array(element.clone(), (to_v - from_v) as u32)
                    }
                    (None, Kind::String) => TypeInfo::string((to_v - from_v) as u32),
                    _ => TypeInfo::uint((to_v - from_v) as u32),
                };
                let dst = gen.anon(result_type);
                gen.add_instr(
                    block,
                    Instr::Slice {
                        src: value,
                        from: from_v as u32 * unit_bits,
                        to: to_v as u32 * unit_bits,
                        dst: dst.clone(),
                    },
                );
                Ok((block, vec![dst]))
            }
            Expr::Index {
                loc,
                expr: base,
                index,
            } => {
                if let Some(value) = self.try_fold(gen, block, expr)? {
                    return Ok((block, vec![Value::constant(value)]));
                }
                let (block, value) = self.expr_ssa_single(gen, block, base)?;
                let (unit_bits, count, result_type) = match value.type_info.kind {
                    Kind::Array => {
                        let element = value.type_info.element.as_deref().cloned().unwrap();
                        (element.bits, value.type_info.array_size, element)
                    }
                    Kind::String => (8, value.type_info.bits / 8, TypeInfo::uint(8)),
                    _ => {
                        return Err(self.semantic_err(
                            *loc,
                            format!("cannot index {}", value.type_info),
                        ))
                    }
                };
                let idx = self.fold_index(gen, block, index)?;
                if idx < 0 || idx >= count as i64 {
                    return Err(self.not_constant_err(
                        index.location(),
                        format!("index out of range [{}] with length {}", idx, count),
                    ));
                }
                let dst = gen.anon(result_type);
                gen.add_instr(
                    block,
                    Instr::Slice {
                        src: value,
                        from: idx as u32 * unit_bits,
                        to: (idx as u32 + 1) * unit_bits,
                        dst: dst.clone(),
                    },
                );
                Ok((block, vec![dst]))
            }
            Expr::Field {
                loc,
                expr: base,
                field,
            } => {
                let (block, value) = self.expr_ssa_single(gen, block, base)?;
                let field_info = value.type_info.field(field).cloned().ok_or_else(|| {
                    self.semantic_err(
                        *loc,
                        format!("{} has no field '{}'", value.type_info, field),
                    )
                })?;
                let dst = gen.anon(field_info.type_info.clone());
                gen.add_instr(
                    block,
                    Instr::Slice {
                        src: value,
                        from: field_info.offset,
                        to: field_info.offset + field_info.type_info.bits,
                        dst: dst.clone(),
                    },
                );
                Ok((block, vec![dst]))
            }
            Expr::Composite {
                loc,
                type_name,
                type_info,
                values,
            } => self.expr_composite(gen, block, *loc, type_name, type_info, values),
            Expr::Make { type_info, .. } => {
                let zero = self.adopt(Value::constant(ConstValue::Int(0)), type_info);
                let dst = gen.anon(type_info.clone());
                gen.add_instr(block, Instr::Mov(zero, dst.clone()));
                Ok((block, vec![dst]))
            }
        }
    }

    fn expr_composite(
        &mut self,
        gen: &mut Generator,
        mut block: BlockId,
        loc: Point,
        type_name: &Option<String>,
        type_info: &Option<TypeInfo>,
        values: &[(Option<String>, Expr)],
    ) -> Result<(BlockId, Vec<Value>), CompileError> {
        let type_info = match (type_info, type_name) {
            (Some(t), _) => t.clone(),
            (None, Some(name)) => self
                .unit
                .type_decl(name)
                .cloned()
                .ok_or_else(|| self.semantic_err(loc, format!("unknown type: {}", name)))?,
            _ => return Err(self.semantic_err(loc, "invalid composite literal".to_string())),
        };

        // Start from the zero value and splice each element in.
        let zero = self.adopt(Value::constant(ConstValue::Int(0)), &type_info);
        let mut current = gen.anon(type_info.clone());
        gen.add_instr(block, Instr::Mov(zero, current.clone()));

        match type_info.kind {
            Kind::Array => {
                let element = type_info.element.as_deref().cloned().unwrap();
                if values.len() != type_info.array_size as usize {
                    return Err(self.semantic_err(
                        loc,
                        format!(
                            "expected {} elements, got {}",
                            type_info.array_size,
                            values.len()
                        ),
                    ));
                }
                for (idx, (field, value)) in values.iter().enumerate() {
                    if field.is_some() {
                        return Err(self.semantic_err(
                            loc,
                            "field name in array literal".to_string(),
                        ));
                    }
                    let (next, v) = self.expr_ssa_single(gen, block, value)?;
                    block = next;
                    let v = self.adopt(v, &element);
                    let dst = gen.anon(type_info.clone());
                    gen.add_instr(
                        block,
                        Instr::Amov {
                            value: v,
                            array: current,
                            from: idx as u32 * element.bits,
                            to: (idx as u32 + 1) * element.bits,
                            dst: dst.clone(),
                        },
                    );
                    current = dst;
                }
            }
            Kind::Struct => {
                for (idx, (field, value)) in values.iter().enumerate() {
                    let field_info = match field {
                        Some(name) => type_info.field(name).cloned().ok_or_else(|| {
                            self.semantic_err(
                                loc,
                                format!("{} has no field '{}'", type_info, name),
                            )
                        })?,
                        None => type_info.fields.get(idx).cloned().ok_or_else(|| {
                            self.semantic_err(loc, "too many values".to_string())
                        })?,
                    };
                    let (next, v) = self.expr_ssa_single(gen, block, value)?;
                    block = next;
                    let v = self.adopt(v, &field_info.type_info);
                    let dst = gen.anon(type_info.clone());
                    gen.add_instr(
                        block,
                        Instr::Amov {
                            value: v,
                            array: current,
                            from: field_info.offset,
                            to: field_info.offset + field_info.type_info.bits,
                            dst: dst.clone(),
                        },
                    );
                    current = dst;
                }
            }
            _ => {
                return Err(self.semantic_err(
                    loc,
                    format!("invalid composite literal type {}", type_info),
                ))
            }
        }
        Ok((block, vec![current]))
    }

    fn expr_call(
        &mut self,
        gen: &mut Generator,
        mut block: BlockId,
        loc: Point,
        name: &crate::ast::Name,
        args: &[Expr],
    ) -> Result<(BlockId, Vec<Value>), CompileError> {
        // Builtins: fold if possible, then try the SSA emitter.
        if let Some(builtin) = builtins::find(name.package.as_deref(), &name.name) {
            if builtin.fold.is_some() {
                if let Some(value) = self.try_fold(
                    gen,
                    block,
                    &Expr::Call {
                        loc,
                        name: name.clone(),
                        args: args.to_vec(),
                    },
                )? {
                    return Ok((block, vec![Value::constant(value)]));
                }
            }
            if let Some(ssa) = builtin.ssa {
                return ssa(self, gen, block, args);
            }
            return Err(self.semantic_err(
                loc,
                format!("builtin {} is not usable here", name),
            ));
        }

        if name.package.is_some() {
            return Err(self.semantic_err(
                loc,
                format!("package '{}' not found", name.package.as_ref().unwrap()),
            ));
        }
        let called = self
            .unit
            .function(&name.name)
            .cloned()
            .ok_or_else(|| {
                self.semantic_err(loc, format!("function '{}' not defined", name))
            })?;

        if self.call_stack.contains(&called.name) {
            return Err(self.semantic_err(
                loc,
                format!("recursive call to '{}'", called.name),
            ));
        }

        // Evaluate call arguments; a single call may fan out.
        let mut values = Vec::new();
        for arg in args {
            let (next, vs) = self.expr_ssa(gen, block, arg)?;
            block = next;
            if vs.is_empty() {
                return Err(self.semantic_err(
                    arg.location(),
                    format!("{} used as value", arg),
                ));
            }
            if args.len() > 1 && vs.len() > 1 {
                return Err(self.semantic_err(
                    arg.location(),
                    format!("multiple-value {} in single-value context", arg),
                ));
            }
            values.extend(vs);
        }
        if values.len() != called.args.len() {
            let verb = if values.len() < called.args.len() {
                "not enough"
            } else {
                "too many"
            };
            return Err(self.semantic_err(
                loc,
                format!("{} arguments in call to {}", verb, name),
            ));
        }

        // Inline the call: bind arguments in a fresh start block,
        // specialize placeholder widths to the caller's widths.
        let rblock = gen.block();
        gen.blocks[rblock].bindings = gen.blocks[block].bindings.clone();
        let start = gen.block();
        let ret = gen.block();

        for (arg, value) in called.args.iter().zip(values.into_iter()) {
            let mut type_info = arg.type_info.clone();
            if type_info.bits == 0 {
                type_info.bits = value.bits();
                type_info.min_bits = type_info.bits;
            }
            let value = self.adopt(value, &type_info);
            if !type_info.compatible(&value.type_info) {
                return Err(self.semantic_err(
                    loc,
                    format!(
                        "invalid value {} (type {}) for argument '{}' of {}",
                        value, value.type_info, arg.name, name
                    ),
                ));
            }
            let param = gen.new_value(&arg.name, type_info);
            gen.add_instr(block, Instr::Mov(value, param.clone()));
            gen.blocks[start]
                .bindings
                .insert(arg.name.clone(), param);
        }

        self.frames.push(Frame {
            start,
            ret,
            func: called.clone(),
        });
        self.call_stack.push(called.name.clone());
        gen.blocks[block].next = Some(start);

        let body_end = self.stmt_list(gen, start, &called.body)?;
        if !gen.blocks[body_end].dead {
            if called.returns.is_empty() {
                gen.blocks[body_end].next = Some(ret);
            } else {
                self.frames.pop();
                self.call_stack.pop();
                return Err(self.semantic_err(called.loc, "missing return".to_string()));
            }
        }

        let mut results = Vec::new();
        for idx in 0..called.returns.len() {
            let value = gen
                .return_binding(start, &ret_name(idx), ret)
                .ok_or_else(|| {
                    self.semantic_err(called.loc, "missing return".to_string())
                })?;
            results.push(value);
        }
        gen.blocks[ret].next = Some(rblock);

        self.frames.pop();
        self.call_stack.pop();
        Ok((rblock, results))
    }

    /// Emit one binary instruction, resolving the operand and result
    /// types.
    fn binary_values(
        &mut self,
        gen: &mut Generator,
        block: BlockId,
        loc: Point,
        op: BinaryOp,
        l: Value,
        r: Value,
    ) -> Result<(BlockId, Value), CompileError> {
        // Shift counts keep their own width.
        let shift = matches!(op, BinaryOp::Lshift | BinaryOp::Rshift);
        let (l, r) = if shift {
            let l = if l.type_info.is_concrete() {
                l
            } else {
                let t = self.concrete_type(&l);
                self.adopt(l, &t)
            };
            (l, r)
        } else {
            if !l.type_info.compatible(&r.type_info) {
                return Err(self.semantic_err(
                    loc,
                    format!("invalid types: {} {} {}", l.type_info, op, r.type_info),
                ));
            }
            // Resolve untyped operands against the typed side.
            let (l, r) = if l.type_info.is_concrete() {
                let r = self.adopt(r, &l.type_info);
                (l, r)
            } else if r.type_info.is_concrete() {
                let l = self.adopt(l, &r.type_info);
                (l, r)
            } else {
                let t = self.concrete_type(&l);
                let l = self.adopt(l, &t);
                let r = self.adopt(r, &t);
                (l, r)
            };
            (l, r)
        };

        let result_type = match op {
            BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::Lshift
            | BinaryOp::Rshift
            | BinaryOp::Band
            | BinaryOp::Bclear
            | BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Bor
            | BinaryOp::Bxor => l.type_info.clone(),
            BinaryOp::Eq
            | BinaryOp::Neq
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::And
            | BinaryOp::Or => TypeInfo::bool(),
        };
        if matches!(op, BinaryOp::And | BinaryOp::Or)
            && (l.type_info.kind != Kind::Bool || r.type_info.kind != Kind::Bool)
        {
            return Err(self.semantic_err(
                loc,
                format!("invalid types: {} {} {}", l.type_info, op, r.type_info),
            ));
        }

        let dst = gen.anon(result_type);
        let instr = match op {
            BinaryOp::Mul => Instr::Mul(l, r, dst.clone()),
            BinaryOp::Div => Instr::Div(l, r, dst.clone()),
            BinaryOp::Mod => Instr::Mod(l, r, dst.clone()),
            BinaryOp::Lshift => Instr::Lshift(l, r, dst.clone()),
            BinaryOp::Rshift => Instr::Rshift(l, r, dst.clone()),
            BinaryOp::Band => Instr::Band(l, r, dst.clone()),
            BinaryOp::Bclear => Instr::Bclr(l, r, dst.clone()),
            BinaryOp::Add => Instr::Add(l, r, dst.clone()),
            BinaryOp::Sub => Instr::Sub(l, r, dst.clone()),
            BinaryOp::Bor => Instr::Bor(l, r, dst.clone()),
            BinaryOp::Bxor => Instr::Bxor(l, r, dst.clone()),
            BinaryOp::Eq => Instr::Eq(l, r, dst.clone()),
            BinaryOp::Neq => Instr::Neq(l, r, dst.clone()),
            BinaryOp::Lt => Instr::Lt(l, r, dst.clone()),
            BinaryOp::Le => Instr::Le(l, r, dst.clone()),
            BinaryOp::Gt => Instr::Gt(l, r, dst.clone()),
            BinaryOp::Ge => Instr::Ge(l, r, dst.clone()),
            BinaryOp::And => Instr::And(l, r, dst.clone()),
            BinaryOp::Or => Instr::Or(l, r, dst.clone()),
        };
        gen.add_instr(block, instr);
        Ok((block, dst))
    }
}
