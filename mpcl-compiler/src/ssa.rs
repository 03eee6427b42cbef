//! SSA intermediate representation.
//!
//! Every value is assigned exactly once; control-flow joins select
//! between values with `phi` instructions. Blocks form a DAG linked by
//! `next`/`branch` pointers; no jump instructions are emitted. Because
//! all control flow is resolved at compile time, instructions carry a
//! global sequence number whose order is a valid execution order.

use mpcl_circuit::{Kind, TypeInfo};
use std::collections::BTreeMap;
use std::fmt;

/// A compile-time constant value.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<ConstValue>),
}

impl ConstValue {
    /// The smallest width able to represent the value.
    pub fn min_bits(&self) -> u32 {
        match self {
            ConstValue::Bool(_) => 1,
            ConstValue::Int(v) => {
                if *v >= 0 {
                    (64 - v.leading_zeros()).max(1)
                } else {
                    64
                }
            }
            ConstValue::Str(s) => s.len() as u32 * 8,
            ConstValue::Array(values) => values.iter().map(|v| v.min_bits()).sum(),
        }
    }

    /// The bit pattern of the value, little-endian, `bits` wide.
    pub fn bits(&self, bits: u32) -> Vec<bool> {
        let mut out = vec![false; bits as usize];
        match self {
            ConstValue::Bool(b) => {
                if !out.is_empty() {
                    out[0] = *b;
                }
            }
            ConstValue::Int(v) => {
                for (i, bit) in out.iter_mut().enumerate().take(64.min(bits as usize)) {
                    *bit = (*v >> i) & 1 == 1;
                }
                // Sign extension for negative literals.
                if *v < 0 {
                    for bit in out.iter_mut().skip(64) {
                        *bit = true;
                    }
                }
            }
            ConstValue::Str(s) => {
                for (i, byte) in s.bytes().enumerate() {
                    for j in 0..8 {
                        let pos = i * 8 + j;
                        if pos < out.len() {
                            out[pos] = (byte >> j) & 1 == 1;
                        }
                    }
                }
            }
            ConstValue::Array(values) => {
                let mut offset = 0;
                for value in values {
                    let width = value.min_bits();
                    for (i, bit) in value.bits(width).into_iter().enumerate() {
                        if offset + i < out.len() {
                            out[offset + i] = bit;
                        }
                    }
                    offset += width as usize;
                }
            }
        }
        out
    }

    /// The natural type of an untyped constant.
    pub fn type_info(&self) -> TypeInfo {
        match self {
            ConstValue::Bool(_) => TypeInfo::bool(),
            ConstValue::Int(_) => {
                let mut t = TypeInfo::int(0);
                t.min_bits = self.min_bits();
                t
            }
            ConstValue::Str(s) => TypeInfo::string(s.len() as u32),
            ConstValue::Array(_) => {
                let mut t = TypeInfo::undefined();
                t.kind = Kind::Array;
                t.min_bits = self.min_bits();
                t
            }
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConstValue::Bool(v) => write!(f, "{}", v),
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::Str(s) => write!(f, "{:?}", s),
            ConstValue::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// An SSA value: a versioned name, or a compile-time constant.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub name: String,
    pub id: u32,
    pub type_info: TypeInfo,
    pub konst: Option<ConstValue>,
}

impl Value {
    pub fn constant(value: ConstValue) -> Value {
        let type_info = value.type_info();
        Value {
            name: format!("${}", value),
            id: 0,
            type_info,
            konst: Some(value),
        }
    }

    pub fn is_const(&self) -> bool {
        self.konst.is_some()
    }

    /// Key used to bind the value's wires in the circuit builder.
    pub fn key(&self) -> String {
        if self.is_const() {
            format!("{}/{}", self.name, self.type_info.bits)
        } else {
            format!("{}#{}", self.name, self.id)
        }
    }

    /// The value's width in wires. Untyped constants fall back to their
    /// minimum width.
    pub fn bits(&self) -> u32 {
        if self.type_info.bits > 0 {
            self.type_info.bits
        } else {
            self.type_info.min_bits.max(1)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_const() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}#{}", self.name, self.id)
        }
    }
}

/// Three-address instructions. Binary instructions carry their result
/// type through the destination value.
#[derive(Clone, Debug)]
pub enum Instr {
    Mov(Value, Value),
    Add(Value, Value, Value),
    Sub(Value, Value, Value),
    Mul(Value, Value, Value),
    Div(Value, Value, Value),
    Mod(Value, Value, Value),
    Band(Value, Value, Value),
    Bor(Value, Value, Value),
    Bxor(Value, Value, Value),
    Bclr(Value, Value, Value),
    Lshift(Value, Value, Value),
    Rshift(Value, Value, Value),
    /// Bit range `[from, to)` of the source.
    Slice {
        src: Value,
        from: u32,
        to: u32,
        dst: Value,
    },
    /// Array element store: copy `array`, splicing `value` into the bit
    /// range `[from, to)`.
    Amov {
        value: Value,
        array: Value,
        from: u32,
        to: u32,
        dst: Value,
    },
    Eq(Value, Value, Value),
    Neq(Value, Value, Value),
    Lt(Value, Value, Value),
    Le(Value, Value, Value),
    Gt(Value, Value, Value),
    Ge(Value, Value, Value),
    And(Value, Value, Value),
    Or(Value, Value, Value),
    Phi {
        cond: Value,
        t: Value,
        f: Value,
        dst: Value,
    },
    Ret(Vec<Value>),
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Instr::Mov(src, dst) => write!(f, "mov    {} {}", src, dst),
            Instr::Add(x, y, z) => write!(f, "add    {} {} {}", x, y, z),
            Instr::Sub(x, y, z) => write!(f, "sub    {} {} {}", x, y, z),
            Instr::Mul(x, y, z) => write!(f, "mul    {} {} {}", x, y, z),
            Instr::Div(x, y, z) => write!(f, "div    {} {} {}", x, y, z),
            Instr::Mod(x, y, z) => write!(f, "mod    {} {} {}", x, y, z),
            Instr::Band(x, y, z) => write!(f, "band   {} {} {}", x, y, z),
            Instr::Bor(x, y, z) => write!(f, "bor    {} {} {}", x, y, z),
            Instr::Bxor(x, y, z) => write!(f, "bxor   {} {} {}", x, y, z),
            Instr::Bclr(x, y, z) => write!(f, "bclr   {} {} {}", x, y, z),
            Instr::Lshift(x, y, z) => write!(f, "lshift {} {} {}", x, y, z),
            Instr::Rshift(x, y, z) => write!(f, "rshift {} {} {}", x, y, z),
            Instr::Slice { src, from, to, dst } => {
                write!(f, "slice  {} [{}:{}] {}", src, from, to, dst)
            }
            Instr::Amov {
                value,
                array,
                from,
                to,
                dst,
            } => write!(f, "amov   {} {} [{}:{}] {}", value, array, from, to, dst),
            Instr::Eq(x, y, z) => write!(f, "eq     {} {} {}", x, y, z),
            Instr::Neq(x, y, z) => write!(f, "neq    {} {} {}", x, y, z),
            Instr::Lt(x, y, z) => write!(f, "lt     {} {} {}", x, y, z),
            Instr::Le(x, y, z) => write!(f, "le     {} {} {}", x, y, z),
            Instr::Gt(x, y, z) => write!(f, "gt     {} {} {}", x, y, z),
            Instr::Ge(x, y, z) => write!(f, "ge     {} {} {}", x, y, z),
            Instr::And(x, y, z) => write!(f, "and    {} {} {}", x, y, z),
            Instr::Or(x, y, z) => write!(f, "or     {} {} {}", x, y, z),
            Instr::Phi { cond, t, f: fv, dst } => {
                write!(f, "phi    {} {} {} {}", cond, t, fv, dst)
            }
            Instr::Ret(values) => {
                write!(f, "ret   ")?;
                for v in values {
                    write!(f, " {}", v)?;
                }
                Ok(())
            }
        }
    }
}

/// Name bindings at the end of one block. Deterministic iteration order
/// matters: phi emission at joins follows it.
pub type Bindings = BTreeMap<String, Value>;

pub type BlockId = usize;

/// One basic block of the SSA DAG.
#[derive(Clone, Debug, Default)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<(u64, Instr)>,
    pub bindings: Bindings,
    pub branch_cond: Option<Value>,
    pub next: Option<BlockId>,
    pub branch: Option<BlockId>,
    pub dead: bool,
}

/// Allocates SSA values and blocks.
#[derive(Default)]
pub struct Generator {
    pub blocks: Vec<Block>,
    next_value_id: u32,
    seq: u64,
}

impl Generator {
    pub fn new() -> Self {
        Generator::default()
    }

    /// A fresh detached block.
    pub fn block(&mut self) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(Block {
            id,
            ..Block::default()
        });
        id
    }

    /// A fresh block chained as `parent`'s fallthrough successor,
    /// inheriting its bindings.
    pub fn next_block(&mut self, parent: BlockId) -> BlockId {
        let id = self.block();
        self.blocks[id].bindings = self.blocks[parent].bindings.clone();
        self.blocks[parent].next = Some(id);
        id
    }

    /// A fresh block chained as `parent`'s branch-taken successor.
    pub fn branch_block(&mut self, parent: BlockId) -> BlockId {
        let id = self.block();
        self.blocks[id].bindings = self.blocks[parent].bindings.clone();
        self.blocks[parent].branch = Some(id);
        id
    }

    /// A fresh versioned value.
    pub fn new_value(&mut self, name: &str, type_info: TypeInfo) -> Value {
        let id = self.next_value_id;
        self.next_value_id += 1;
        Value {
            name: name.to_string(),
            id,
            type_info,
            konst: None,
        }
    }

    /// A fresh anonymous value.
    pub fn anon(&mut self, type_info: TypeInfo) -> Value {
        self.new_value("%_", type_info)
    }

    pub fn add_instr(&mut self, block: BlockId, instr: Instr) {
        let seq = self.seq;
        self.seq += 1;
        self.blocks[block].instrs.push((seq, instr));
    }

    /// Merge two branch-arm binding sets into a join block: for every
    /// name bound on both sides, differing values merge through a phi
    /// selected by `cond`.
    pub fn merge_bindings(
        &mut self,
        cond: &Value,
        true_bindings: &Bindings,
        false_bindings: &Bindings,
        join: BlockId,
    ) -> Bindings {
        let mut merged = Bindings::new();
        for (name, t_value) in true_bindings {
            let f_value = match false_bindings.get(name) {
                Some(v) => v,
                None => continue,
            };
            if t_value == f_value {
                merged.insert(name.clone(), t_value.clone());
                continue;
            }
            let type_info = if t_value.type_info.is_concrete() {
                t_value.type_info.clone()
            } else {
                f_value.type_info.clone()
            };
            let dst = self.anon(type_info);
            self.add_instr(
                join,
                Instr::Phi {
                    cond: cond.clone(),
                    t: t_value.clone(),
                    f: f_value.clone(),
                    dst: dst.clone(),
                },
            );
            merged.insert(name.clone(), dst);
        }
        merged
    }

    /// Resolve the value of `name` on all paths from `block` to
    /// `ret_block`, synthesising phis in `ret_block` where paths
    /// disagree. Used to pick up early returns. Results are memoized
    /// per block so that diamonds in the DAG are resolved once.
    pub fn return_binding(
        &mut self,
        block: BlockId,
        name: &str,
        ret_block: BlockId,
    ) -> Option<Value> {
        let mut memo = BTreeMap::new();
        self.return_binding_memo(block, name, ret_block, &mut memo)
    }

    fn return_binding_memo(
        &mut self,
        block: BlockId,
        name: &str,
        ret_block: BlockId,
        memo: &mut BTreeMap<BlockId, Option<Value>>,
    ) -> Option<Value> {
        if let Some(cached) = memo.get(&block) {
            return cached.clone();
        }
        let result = self.return_binding_uncached(block, name, ret_block, memo);
        memo.insert(block, result.clone());
        result
    }

    fn return_binding_uncached(
        &mut self,
        block: BlockId,
        name: &str,
        ret_block: BlockId,
        memo: &mut BTreeMap<BlockId, Option<Value>>,
    ) -> Option<Value> {
        let (branch_cond, branch, next) = {
            let b = &self.blocks[block];
            (b.branch_cond.clone(), b.branch, b.next)
        };
        if let (Some(cond), Some(t_block), Some(f_block)) = (branch_cond, branch, next) {
            let t_value = self.return_binding_memo(t_block, name, ret_block, memo)?;
            let f_value = self.return_binding_memo(f_block, name, ret_block, memo)?;
            if t_value == f_value {
                return Some(t_value);
            }
            let type_info = if t_value.type_info.is_concrete() {
                t_value.type_info.clone()
            } else {
                f_value.type_info.clone()
            };
            let dst = self.anon(type_info);
            self.add_instr(
                ret_block,
                Instr::Phi {
                    cond,
                    t: t_value,
                    f: f_value,
                    dst: dst.clone(),
                },
            );
            return Some(dst);
        }
        match next {
            Some(next) if next != ret_block => {
                self.return_binding_memo(next, name, ret_block, memo)
            }
            _ => self.blocks[block].bindings.get(name).cloned(),
        }
    }
}

/// A generated SSA program: the block DAG plus the circuit IO binding.
#[derive(Debug)]
pub struct Program {
    pub blocks: Vec<Block>,
    /// One input value per party, bound to the circuit input wires.
    pub inputs: Vec<Value>,
    pub input_types: Vec<TypeInfo>,
    pub output_types: Vec<TypeInfo>,
}

impl Program {
    /// All instructions in execution order.
    pub fn instructions(&self) -> Vec<&Instr> {
        let mut tagged: Vec<(u64, &Instr)> = self
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter().map(|(seq, instr)| (*seq, instr)))
            .collect();
        tagged.sort_by_key(|(seq, _)| *seq);
        tagged.into_iter().map(|(_, instr)| instr).collect()
    }

    /// Render the SSA assembly dump.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if block.instrs.is_empty() && block.next.is_none() && block.branch.is_none() {
                continue;
            }
            out.push_str(&format!("l{}:\n", block.id));
            let mut instrs: Vec<&(u64, Instr)> = block.instrs.iter().collect();
            instrs.sort_by_key(|(seq, _)| *seq);
            for (_, instr) in instrs {
                out.push_str(&format!("\t{}\n", instr));
            }
            if let Some(cond) = &block.branch_cond {
                out.push_str(&format!(
                    "\tif {} goto l{}\n",
                    cond,
                    block.branch.unwrap_or(0)
                ));
            }
            if let Some(next) = block.next {
                out.push_str(&format!("\tgoto l{}\n", next));
            }
        }
        out
    }
}
