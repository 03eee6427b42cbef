//! The circuit builder: a wire arena, sub-circuit templates, a
//! dead-gate pruner, and dense renumbering at finalization.

mod arith;
mod cmp;
mod shift;

pub use arith::{adder, divider, multiplier, subtractor};
pub use cmp::{equal, greater, greater_or_equal, less, less_or_equal, not_equal};
pub use shift::{barrel_shift_left, barrel_shift_right, shift_left, shift_right};

use mpcl_circuit::{Circuit, Gate, Io, Op};
use std::collections::{HashMap, HashSet};

use crate::error::{CompileError, Point};

/// Index into the builder's wire arena. Renumbered into dense circuit
/// ids only at finalization.
pub type WireId = u32;

struct BuilderGate {
    op: Op,
    x: WireId,
    y: WireId,
    z: WireId,
}

/// Builds a circuit gate by gate. Wires are allocated eagerly as arena
/// indices; gates reference them by index, and the consumer relation is
/// derived during pruning instead of being maintained incrementally.
pub struct Builder {
    num_wires: u32,
    gates: Vec<BuilderGate>,
    num_inputs: u32,
    outputs: Vec<WireId>,
    output_set: HashSet<WireId>,
    zero: Option<WireId>,
    one: Option<WireId>,
    bindings: HashMap<String, Vec<WireId>>,
}

impl Builder {
    /// A builder over `input_bits` circuit input wires; wires
    /// `0..input_bits` are the inputs.
    pub fn new(input_bits: u32) -> Builder {
        Builder {
            num_wires: input_bits,
            gates: Vec::new(),
            num_inputs: input_bits,
            outputs: Vec::new(),
            output_set: HashSet::new(),
            zero: None,
            one: None,
            bindings: HashMap::new(),
        }
    }

    pub fn wire(&mut self) -> WireId {
        let w = self.num_wires;
        self.num_wires += 1;
        w
    }

    /// Emit a binary gate, returning its output wire.
    pub fn gate(&mut self, op: Op, x: WireId, y: WireId) -> WireId {
        let z = self.wire();
        self.gates.push(BuilderGate { op, x, y, z });
        z
    }

    /// Emit an INV gate.
    pub fn inv(&mut self, x: WireId) -> WireId {
        let z = self.wire();
        self.gates.push(BuilderGate {
            op: Op::Inv,
            x,
            y: x,
            z,
        });
        z
    }

    /// The constant-0 wire: `XOR(in0, in0)`, free under Free-XOR.
    pub fn zero_wire(&mut self) -> WireId {
        if let Some(zero) = self.zero {
            return zero;
        }
        let zero = self.gate(Op::Xor, 0, 0);
        self.zero = Some(zero);
        zero
    }

    /// The constant-1 wire: `XNOR(in0, in0)`.
    pub fn one_wire(&mut self) -> WireId {
        if let Some(one) = self.one {
            return one;
        }
        let one = self.gate(Op::Xnor, 0, 0);
        self.one = Some(one);
        one
    }

    /// Extend the shorter operand with zero wires.
    pub fn zero_pad(&mut self, x: &[WireId], y: &[WireId]) -> (Vec<WireId>, Vec<WireId>) {
        let max = x.len().max(y.len());
        let mut rx = x.to_vec();
        let mut ry = y.to_vec();
        while rx.len() < max {
            rx.push(self.zero_wire());
        }
        while ry.len() < max {
            ry.push(self.zero_wire());
        }
        (rx, ry)
    }

    /// One-bit multiplexer: `sel ? t : f`, three gates with a single
    /// AND.
    pub fn mux_bit(&mut self, sel: WireId, t: WireId, f: WireId) -> WireId {
        let d = self.gate(Op::Xor, t, f);
        let s = self.gate(Op::And, d, sel);
        self.gate(Op::Xor, s, f)
    }

    /// Bit-parallel multiplexer over wire vectors.
    pub fn mux(&mut self, sel: WireId, t: &[WireId], f: &[WireId]) -> Vec<WireId> {
        t.iter()
            .zip(f.iter())
            .map(|(t, f)| self.mux_bit(sel, *t, *f))
            .collect()
    }

    /// Bitwise binary operation over equal-length vectors.
    pub fn bitwise(&mut self, op: Op, x: &[WireId], y: &[WireId]) -> Vec<WireId> {
        x.iter().zip(y.iter()).map(|(x, y)| self.gate(op, *x, *y)).collect()
    }

    /// Bitwise AND-NOT: `x & ^y`.
    pub fn bit_clear(&mut self, x: &[WireId], y: &[WireId]) -> Vec<WireId> {
        x.iter()
            .zip(y.iter())
            .map(|(x, y)| {
                let ny = self.inv(*y);
                self.gate(Op::And, *x, ny)
            })
            .collect()
    }

    /// OR-reduce a vector to one wire.
    pub fn or_reduce(&mut self, wires: &[WireId]) -> WireId {
        match wires.len() {
            0 => self.zero_wire(),
            _ => {
                let mut acc = wires[0];
                for w in &wires[1..] {
                    acc = self.gate(Op::Or, acc, *w);
                }
                acc
            }
        }
    }

    pub fn bind(&mut self, key: String, wires: Vec<WireId>) {
        self.bindings.insert(key, wires);
    }

    pub fn binding(&self, key: &str) -> Option<&Vec<WireId>> {
        self.bindings.get(key)
    }

    /// Register the circuit output wires, in little-endian order over
    /// all declared outputs. Wires that are circuit inputs or already
    /// registered as outputs are routed through an identity gate so
    /// that outputs occupy distinct, gate-produced wires.
    pub fn set_outputs(&mut self, wires: &[WireId]) {
        for &wire in wires {
            let wire = if wire < self.num_inputs || self.output_set.contains(&wire) {
                let zero = self.zero_wire();
                self.gate(Op::Xor, wire, zero)
            } else {
                wire
            };
            self.output_set.insert(wire);
            self.outputs.push(wire);
        }
    }

    /// Prune dead gates, renumber wires densely, and produce the final
    /// circuit. A gate is live iff its output wire is a circuit output
    /// or feeds a live gate; the scan runs backward over the
    /// topologically ordered gate list. Live wires are renumbered with
    /// circuit inputs first, intermediate wires in gate order, and
    /// circuit outputs in the final id range.
    pub fn finalize(
        self,
        prune: bool,
        inputs: Vec<Io>,
        outputs: Io,
    ) -> Result<Circuit, CompileError> {
        let mut live = vec![!prune; self.gates.len()];
        if prune {
            let mut needed = vec![false; self.num_wires as usize];
            for &out in &self.outputs {
                needed[out as usize] = true;
            }
            for (idx, gate) in self.gates.iter().enumerate().rev() {
                if !needed[gate.z as usize] {
                    continue;
                }
                live[idx] = true;
                needed[gate.x as usize] = true;
                if gate.op != Op::Inv {
                    needed[gate.y as usize] = true;
                }
            }
        }

        const UNASSIGNED: u32 = u32::MAX;
        let mut ids = vec![UNASSIGNED; self.num_wires as usize];
        let mut next_id = 0u32;
        for id in ids.iter_mut().take(self.num_inputs as usize) {
            *id = next_id;
            next_id += 1;
        }
        for (idx, gate) in self.gates.iter().enumerate() {
            if live[idx] && !self.output_set.contains(&gate.z) {
                ids[gate.z as usize] = next_id;
                next_id += 1;
            }
        }
        for &out in &self.outputs {
            ids[out as usize] = next_id;
            next_id += 1;
        }

        let mut gates = Vec::with_capacity(self.gates.len());
        for (idx, gate) in self.gates.iter().enumerate() {
            if !live[idx] {
                continue;
            }
            let x = ids[gate.x as usize];
            let z = ids[gate.z as usize];
            if x == UNASSIGNED || z == UNASSIGNED {
                return Err(CompileError::semantic(
                    "",
                    Point::default(),
                    "internal error: dangling wire in circuit".to_string(),
                ));
            }
            if gate.op == Op::Inv {
                gates.push(Gate::inv(x, z));
            } else {
                let y = ids[gate.y as usize];
                if y == UNASSIGNED {
                    return Err(CompileError::semantic(
                        "",
                        Point::default(),
                        "internal error: dangling wire in circuit".to_string(),
                    ));
                }
                gates.push(Gate::binary(gate.op, x, y, z));
            }
        }

        Ok(Circuit::new(next_id as usize, inputs, outputs, gates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpcl_circuit::{IoArg, TypeInfo};
    use num_bigint::BigUint;

    fn io(bits: u32) -> Io {
        Io(vec![IoArg {
            name: "v".to_string(),
            type_info: TypeInfo::uint(bits),
        }])
    }

    fn eval2(circuit: &Circuit, a: u64, b: u64, a_bits: u32) -> u64 {
        let packed = BigUint::from(a) | (BigUint::from(b) << a_bits);
        let out = circuit.eval(&packed).unwrap();
        out.to_u64_digits().first().copied().unwrap_or(0)
    }

    fn binary_template(
        bits: u32,
        f: impl Fn(&mut Builder, &[WireId], &[WireId]) -> Vec<WireId>,
    ) -> Circuit {
        let mut b = Builder::new(bits * 2);
        let x: Vec<WireId> = (0..bits).collect();
        let y: Vec<WireId> = (bits..bits * 2).collect();
        let r = f(&mut b, &x, &y);
        b.set_outputs(&r);
        b.finalize(true, vec![io(bits), io(bits)], io(r.len() as u32))
            .unwrap()
    }

    #[test]
    fn adder_matches_reference() {
        let circuit = binary_template(3, |b, x, y| adder(b, x, y));
        for a in 0u64..8 {
            for c in 0u64..8 {
                assert_eq!(eval2(&circuit, a, c, 3), (a + c) % 8, "a={} c={}", a, c);
            }
        }
    }

    #[test]
    fn subtractor_matches_reference() {
        let circuit = binary_template(4, |b, x, y| subtractor(b, x, y));
        for a in 0u64..16 {
            for c in 0u64..16 {
                assert_eq!(
                    eval2(&circuit, a, c, 4),
                    (a.wrapping_sub(c)) & 0xf,
                    "a={} c={}",
                    a,
                    c
                );
            }
        }
    }

    #[test]
    fn multiplier_matches_reference() {
        let circuit = binary_template(6, |b, x, y| multiplier(b, x, y));
        for a in 0u64..64 {
            for c in 0u64..64 {
                assert_eq!(eval2(&circuit, a, c, 6), (a * c) % 64, "a={} c={}", a, c);
            }
        }
    }

    #[test]
    fn divider_matches_reference() {
        let circuit = binary_template(8, |b, x, y| divider(b, x, y).0);
        let rem = binary_template(8, |b, x, y| divider(b, x, y).1);
        for a in (0u64..256).step_by(7) {
            for c in 1u64..256 {
                assert_eq!(eval2(&circuit, a, c, 8), a / c, "a={} c={}", a, c);
                assert_eq!(eval2(&rem, a, c, 8), a % c, "a={} c={}", a, c);
            }
        }
    }

    #[test]
    fn comparators_match_reference() {
        let lt = binary_template(4, |b, x, y| vec![less(b, x, y, false)]);
        let le = binary_template(4, |b, x, y| vec![less_or_equal(b, x, y, false)]);
        let eq = binary_template(4, |b, x, y| vec![equal(b, x, y)]);
        let ne = binary_template(4, |b, x, y| vec![not_equal(b, x, y)]);
        for a in 0u64..16 {
            for c in 0u64..16 {
                assert_eq!(eval2(&lt, a, c, 4) == 1, a < c);
                assert_eq!(eval2(&le, a, c, 4) == 1, a <= c);
                assert_eq!(eval2(&eq, a, c, 4) == 1, a == c);
                assert_eq!(eval2(&ne, a, c, 4) == 1, a != c);
            }
        }
    }

    #[test]
    fn signed_comparator() {
        let lt = binary_template(4, |b, x, y| vec![less(b, x, y, true)]);
        for a in -8i64..8 {
            for c in -8i64..8 {
                let got = eval2(&lt, (a & 0xf) as u64, (c & 0xf) as u64, 4) == 1;
                assert_eq!(got, a < c, "a={} c={}", a, c);
            }
        }
    }

    #[test]
    fn barrel_shifter_matches_reference() {
        let left = binary_template(8, |b, x, y| barrel_shift_left(b, x, y));
        let right = binary_template(8, |b, x, y| barrel_shift_right(b, x, y, false));
        for a in [0u64, 1, 0x5a, 0xff] {
            for c in 0u64..12 {
                let expect_l = if c >= 8 { 0 } else { (a << c) & 0xff };
                let expect_r = if c >= 8 { 0 } else { a >> c };
                assert_eq!(eval2(&left, a, c, 8), expect_l, "a={} c={}", a, c);
                assert_eq!(eval2(&right, a, c, 8), expect_r, "a={} c={}", a, c);
            }
        }
    }

    #[test]
    fn prune_is_idempotent() {
        // Build a circuit with dead gates, prune twice through two
        // identical builders, and compare.
        let build = || {
            let mut b = Builder::new(4);
            let x: Vec<WireId> = (0..2).collect();
            let y: Vec<WireId> = (2..4).collect();
            let sum = adder(&mut b, &x, &y);
            let _dead = multiplier(&mut b, &x, &y);
            b.set_outputs(&sum);
            b.finalize(true, vec![io(2), io(2)], io(2)).unwrap()
        };
        let first = build();
        let second = build();
        assert_eq!(first, second);
        // No multiplier AND gates survive beyond the adder's needs.
        let full = {
            let mut b = Builder::new(4);
            let x: Vec<WireId> = (0..2).collect();
            let y: Vec<WireId> = (2..4).collect();
            let sum = adder(&mut b, &x, &y);
            b.set_outputs(&sum);
            b.finalize(true, vec![io(2), io(2)], io(2)).unwrap()
        };
        assert_eq!(first.num_gates(), full.num_gates());
    }
}
