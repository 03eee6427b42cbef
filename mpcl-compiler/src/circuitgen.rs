//! SSA to Boolean circuit lowering.

use mpcl_circuit::{Circuit, Io, Kind, Op};

use crate::circuits::{
    adder, barrel_shift_left, barrel_shift_right, divider, equal, greater, greater_or_equal,
    less, less_or_equal, multiplier, not_equal, shift_left, shift_right, subtractor, Builder,
    WireId,
};
use crate::error::{CompileError, Point};
use crate::ssa::{ConstValue, Instr, Program, Value};
use crate::Params;

struct Lowering<'a> {
    builder: Builder,
    source: &'a str,
}

/// Lower an SSA program to gates and finalize the circuit.
pub fn build(
    program: &Program,
    params: &Params,
    source: &str,
    inputs: Vec<Io>,
    outputs: Io,
) -> Result<Circuit, CompileError> {
    let input_bits: u32 = program.input_types.iter().map(|t| t.bits).sum();
    let mut lowering = Lowering {
        builder: Builder::new(input_bits),
        source,
    };

    // Bind each party's input value to its range of input wires.
    let mut offset = 0u32;
    for value in &program.inputs {
        let bits = value.bits();
        let wires: Vec<WireId> = (offset..offset + bits).collect();
        lowering.builder.bind(value.key(), wires);
        offset += bits;
    }

    for instr in program.instructions() {
        lowering.instr(instr)?;
    }

    lowering
        .builder
        .finalize(params.opt_prune_gates, inputs, outputs)
}

impl<'a> Lowering<'a> {
    fn err(&self, message: String) -> CompileError {
        CompileError::semantic(self.source, Point::default(), message)
    }

    /// The wire vector of a value, materializing constants on demand.
    fn wires(&mut self, value: &Value) -> Result<Vec<WireId>, CompileError> {
        if let Some(wires) = self.builder.binding(&value.key()) {
            return Ok(wires.clone());
        }
        let konst = value
            .konst
            .as_ref()
            .ok_or_else(|| self.err(format!("value {} used before definition", value)))?;
        let bits = konst.bits(value.bits());
        let wires: Vec<WireId> = bits
            .iter()
            .map(|bit| {
                if *bit {
                    self.builder.one_wire()
                } else {
                    self.builder.zero_wire()
                }
            })
            .collect();
        self.builder.bind(value.key(), wires.clone());
        Ok(wires)
    }

    /// Truncate or extend a wire vector to `to` bits; signed values
    /// extend with their sign wire.
    fn resize(&mut self, wires: Vec<WireId>, kind: Kind, to: u32) -> Vec<WireId> {
        let to = to as usize;
        if wires.len() >= to {
            return wires[..to].to_vec();
        }
        let fill = if kind == Kind::Int && !wires.is_empty() {
            wires[wires.len() - 1]
        } else {
            self.builder.zero_wire()
        };
        let mut out = wires;
        out.resize(to, fill);
        out
    }

    fn operand(&mut self, value: &Value, width: u32) -> Result<Vec<WireId>, CompileError> {
        let wires = self.wires(value)?;
        Ok(self.resize(wires, value.type_info.kind, width))
    }

    fn bind(&mut self, dst: &Value, wires: Vec<WireId>) {
        self.builder.bind(dst.key(), wires);
    }

    fn instr(&mut self, instr: &Instr) -> Result<(), CompileError> {
        match instr {
            Instr::Mov(src, dst) => {
                let wires = self.wires(src)?;
                let wires = self.resize(wires, src.type_info.kind, dst.bits());
                self.bind(dst, wires);
            }
            Instr::Add(x, y, z) => {
                let a = self.operand(x, z.bits())?;
                let b = self.operand(y, z.bits())?;
                let sum = adder(&mut self.builder, &a, &b);
                self.bind(z, sum);
            }
            Instr::Sub(x, y, z) => {
                let a = self.operand(x, z.bits())?;
                let b = self.operand(y, z.bits())?;
                let diff = subtractor(&mut self.builder, &a, &b);
                self.bind(z, diff);
            }
            Instr::Mul(x, y, z) => {
                let a = self.operand(x, z.bits())?;
                let b = self.operand(y, z.bits())?;
                let product = multiplier(&mut self.builder, &a, &b);
                let product = self.resize(product, z.type_info.kind, z.bits());
                self.bind(z, product);
            }
            Instr::Div(x, y, z) => {
                let a = self.operand(x, z.bits())?;
                let b = self.operand(y, z.bits())?;
                let (quotient, _) = divider(&mut self.builder, &a, &b);
                let quotient = self.resize(quotient, z.type_info.kind, z.bits());
                self.bind(z, quotient);
            }
            Instr::Mod(x, y, z) => {
                let a = self.operand(x, z.bits())?;
                let b = self.operand(y, z.bits())?;
                let (_, remainder) = divider(&mut self.builder, &a, &b);
                let remainder = self.resize(remainder, z.type_info.kind, z.bits());
                self.bind(z, remainder);
            }
            Instr::Band(x, y, z) => self.bitwise(Op::And, x, y, z)?,
            Instr::Bor(x, y, z) => self.bitwise(Op::Or, x, y, z)?,
            Instr::Bxor(x, y, z) => self.bitwise(Op::Xor, x, y, z)?,
            Instr::Bclr(x, y, z) => {
                let a = self.operand(x, z.bits())?;
                let b = self.operand(y, z.bits())?;
                let wires = self.builder.bit_clear(&a, &b);
                self.bind(z, wires);
            }
            Instr::Lshift(x, y, z) => {
                let a = self.operand(x, z.bits())?;
                let wires = match &y.konst {
                    Some(ConstValue::Int(count)) => {
                        if *count < 0 {
                            return Err(
                                self.err(format!("negative shift amount {}", count))
                            );
                        }
                        shift_left(&mut self.builder, &a, *count as usize)
                    }
                    _ => {
                        let count = self.wires(y)?;
                        barrel_shift_left(&mut self.builder, &a, &count)
                    }
                };
                self.bind(z, wires);
            }
            Instr::Rshift(x, y, z) => {
                let signed = x.type_info.kind == Kind::Int;
                let a = self.operand(x, z.bits())?;
                let wires = match &y.konst {
                    Some(ConstValue::Int(count)) => {
                        if *count < 0 {
                            return Err(
                                self.err(format!("negative shift amount {}", count))
                            );
                        }
                        shift_right(&mut self.builder, &a, *count as usize, signed)
                    }
                    _ => {
                        let count = self.wires(y)?;
                        barrel_shift_right(&mut self.builder, &a, &count, signed)
                    }
                };
                self.bind(z, wires);
            }
            Instr::Slice { src, from, to, dst } => {
                let wires = self.wires(src)?;
                if *to as usize > wires.len() {
                    return Err(self.err(format!(
                        "slice bounds [{}:{}] out of range for {}",
                        from, to, src
                    )));
                }
                let wires = wires[*from as usize..*to as usize].to_vec();
                let wires = self.resize(wires, dst.type_info.kind, dst.bits());
                self.bind(dst, wires);
            }
            Instr::Amov {
                value,
                array,
                from,
                to,
                dst,
            } => {
                let mut wires = self.operand(array, dst.bits())?;
                let spliced = self.operand(value, to - from)?;
                wires.splice(
                    *from as usize..*to as usize,
                    spliced.iter().copied(),
                );
                self.bind(dst, wires);
            }
            Instr::Eq(x, y, z) => self.compare(equal, x, y, z)?,
            Instr::Neq(x, y, z) => self.compare(not_equal, x, y, z)?,
            Instr::Lt(x, y, z) => self.compare_signed(less, x, y, z)?,
            Instr::Le(x, y, z) => self.compare_signed(less_or_equal, x, y, z)?,
            Instr::Gt(x, y, z) => self.compare_signed(greater, x, y, z)?,
            Instr::Ge(x, y, z) => self.compare_signed(greater_or_equal, x, y, z)?,
            Instr::And(x, y, z) => {
                let a = self.operand(x, 1)?;
                let b = self.operand(y, 1)?;
                let w = self.builder.gate(Op::And, a[0], b[0]);
                self.bind(z, vec![w]);
            }
            Instr::Or(x, y, z) => {
                let a = self.operand(x, 1)?;
                let b = self.operand(y, 1)?;
                let w = self.builder.gate(Op::Or, a[0], b[0]);
                self.bind(z, vec![w]);
            }
            Instr::Phi { cond, t, f, dst } => {
                let sel = self.operand(cond, 1)?;
                let t = self.operand(t, dst.bits())?;
                let f = self.operand(f, dst.bits())?;
                let wires = self.builder.mux(sel[0], &t, &f);
                self.bind(dst, wires);
            }
            Instr::Ret(values) => {
                let mut outputs = Vec::new();
                for value in values {
                    outputs.extend(self.wires(value)?);
                }
                self.builder.set_outputs(&outputs);
            }
        }
        Ok(())
    }

    fn bitwise(&mut self, op: Op, x: &Value, y: &Value, z: &Value) -> Result<(), CompileError> {
        let a = self.operand(x, z.bits())?;
        let b = self.operand(y, z.bits())?;
        let wires = self.builder.bitwise(op, &a, &b);
        self.bind(z, wires);
        Ok(())
    }

    fn compare(
        &mut self,
        f: fn(&mut Builder, &[WireId], &[WireId]) -> WireId,
        x: &Value,
        y: &Value,
        z: &Value,
    ) -> Result<(), CompileError> {
        let width = x.bits().max(y.bits());
        let a = self.operand(x, width)?;
        let b = self.operand(y, width)?;
        let w = f(&mut self.builder, &a, &b);
        self.bind(z, vec![w]);
        Ok(())
    }

    fn compare_signed(
        &mut self,
        f: fn(&mut Builder, &[WireId], &[WireId], bool) -> WireId,
        x: &Value,
        y: &Value,
        z: &Value,
    ) -> Result<(), CompileError> {
        let signed = x.type_info.kind == Kind::Int || y.type_info.kind == Kind::Int;
        let width = x.bits().max(y.bits());
        let a = self.operand(x, width)?;
        let b = self.operand(y, width)?;
        let w = f(&mut self.builder, &a, &b, signed);
        self.bind(z, vec![w]);
        Ok(())
    }
}
