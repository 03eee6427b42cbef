//! Flat gate-array circuits with typed IO descriptors.

use num_bigint::BigUint;
use std::fmt;

use crate::types::{Kind, TypeInfo};
use crate::Error;

/// Gate operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Xor,
    Xnor,
    And,
    Or,
    Inv,
}

impl Op {
    pub const COUNT: usize = 5;

    pub fn code(self) -> u8 {
        match self {
            Op::Xor => 0,
            Op::Xnor => 1,
            Op::And => 2,
            Op::Or => 3,
            Op::Inv => 4,
        }
    }

    pub fn from_code(code: u8) -> Result<Op, Error> {
        match code {
            0 => Ok(Op::Xor),
            1 => Ok(Op::Xnor),
            2 => Ok(Op::And),
            3 => Ok(Op::Or),
            4 => Ok(Op::Inv),
            _ => Err(Error::Parse(format!("invalid gate op {}", code))),
        }
    }

    /// INV takes a single input; every other op takes two.
    pub fn is_unary(self) -> bool {
        matches!(self, Op::Inv)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Op::Xor => "XOR",
            Op::Xnor => "XNOR",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Inv => "INV",
        };
        name.fmt(f)
    }
}

/// A gate: operation, up to two input wires, one output wire. The gate
/// id used as the garbling tweak is the gate's position in the array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gate {
    pub op: Op,
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Gate {
    pub fn binary(op: Op, x: u32, y: u32, z: u32) -> Gate {
        Gate { op, x, y, z }
    }

    pub fn inv(x: u32, z: u32) -> Gate {
        Gate {
            op: Op::Inv,
            x,
            y: x,
            z,
        }
    }

    /// The second input, absent for INV.
    pub fn input1(&self) -> Option<u32> {
        if self.op.is_unary() {
            None
        } else {
            Some(self.y)
        }
    }
}

/// One named, typed field of a party's IO descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IoArg {
    pub name: String,
    pub type_info: TypeInfo,
}

impl IoArg {
    pub fn bits(&self) -> u32 {
        self.type_info.bits
    }
}

impl fmt::Display for IoArg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.type_info)
        } else {
            write!(f, "{}:{}", self.name, self.type_info)
        }
    }
}

/// An ordered list of IO fields belonging to one party.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Io(pub Vec<IoArg>);

impl Io {
    pub fn total_bits(&self) -> u32 {
        self.0.iter().map(|arg| arg.bits()).sum()
    }

    /// Parse one input literal per field and pack them into a single
    /// little-endian integer, first field at bit 0.
    pub fn parse(&self, inputs: &[String]) -> Result<BigUint, Error> {
        if inputs.len() != self.0.len() {
            return Err(Error::InputArity {
                got: inputs.len(),
                needed: self.0.len(),
            });
        }
        let mut combined = BigUint::default();
        let mut offset = 0u32;
        for (arg, input) in self.0.iter().zip(inputs) {
            let value = parse_value(&arg.type_info, input)?;
            combined |= value << offset;
            offset += arg.bits();
        }
        Ok(combined)
    }

    /// Split a packed little-endian result into one value per field.
    pub fn split(&self, combined: &BigUint) -> Vec<BigUint> {
        let mut results = Vec::with_capacity(self.0.len());
        let mut offset = 0u32;
        for arg in &self.0 {
            let mask = (BigUint::from(1u8) << arg.bits()) - 1u8;
            results.push((combined >> offset) & mask);
            offset += arg.bits();
        }
        results
    }
}

impl fmt::Display for Io {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (idx, arg) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        Ok(())
    }
}

fn parse_value(type_info: &TypeInfo, input: &str) -> Result<BigUint, Error> {
    let bad = || Error::InvalidInput(format!("{} for type {}", input, type_info));
    match type_info.kind {
        Kind::Bool => match input {
            "true" | "1" => Ok(BigUint::from(1u8)),
            "false" | "0" => Ok(BigUint::default()),
            _ => Err(bad()),
        },
        Kind::Uint => parse_uint(input).ok_or_else(bad),
        Kind::Int => {
            if let Some(rest) = input.strip_prefix('-') {
                let magnitude = parse_uint(rest).ok_or_else(bad)?;
                // Two's complement into the declared width.
                let modulus = BigUint::from(1u8) << type_info.bits;
                if magnitude > (&modulus >> 1u32) {
                    return Err(bad());
                }
                Ok((modulus - magnitude) % (BigUint::from(1u8) << type_info.bits))
            } else {
                parse_uint(input).ok_or_else(bad)
            }
        }
        Kind::String => {
            let text = input.trim_matches('"');
            let mut value = BigUint::default();
            for (i, byte) in text.bytes().enumerate() {
                value |= BigUint::from(byte) << (8 * i as u32);
            }
            Ok(value)
        }
        Kind::Array => {
            let element = type_info.element.as_deref().ok_or_else(bad)?;
            if element.kind == Kind::Uint && element.bits == 8 {
                // [N]byte from a hex blob: byte i lands at bit offset 8i.
                let hex = input.strip_prefix("0x").ok_or_else(bad)?;
                let bytes = hex_bytes(hex).ok_or_else(bad)?;
                if bytes.len() != type_info.array_size as usize {
                    return Err(bad());
                }
                let mut value = BigUint::default();
                for (i, byte) in bytes.iter().enumerate() {
                    value |= BigUint::from(*byte) << (8 * i as u32);
                }
                Ok(value)
            } else {
                let inner = input
                    .strip_prefix('[')
                    .and_then(|s| s.strip_suffix(']'))
                    .ok_or_else(bad)?;
                let items: Vec<&str> = inner.split_whitespace().collect();
                if items.len() != type_info.array_size as usize {
                    return Err(bad());
                }
                let mut value = BigUint::default();
                for (i, item) in items.iter().enumerate() {
                    let v = parse_value(element, item)?;
                    value |= v << (element.bits * i as u32);
                }
                Ok(value)
            }
        }
        _ => Err(bad()),
    }
}

fn parse_uint(input: &str) -> Option<BigUint> {
    if let Some(hex) = input.strip_prefix("0x") {
        BigUint::parse_bytes(hex.as_bytes(), 16)
    } else {
        BigUint::parse_bytes(input.as_bytes(), 10)
    }
}

fn hex_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

/// Render a decoded output value according to its declared type.
pub fn format_result(value: &BigUint, type_info: &TypeInfo) -> String {
    match type_info.kind {
        Kind::Bool => format!("{}", value != &BigUint::default()),
        Kind::Uint => format!("0x{:x}\t{}", value, value),
        Kind::Int => {
            let sign_bit = BigUint::from(1u8) << (type_info.bits - 1);
            if value >= &sign_bit {
                let modulus = BigUint::from(1u8) << type_info.bits;
                format!("-{}", modulus - value)
            } else {
                format!("{}", value)
            }
        }
        Kind::String => {
            let mut out = String::new();
            let mask = BigUint::from(0xffu8);
            for i in 0..type_info.bits / 8 {
                let byte = ((value >> (8 * i)) & &mask)
                    .to_u32_digits()
                    .first()
                    .copied()
                    .unwrap_or(0) as u8;
                match char::from_u32(byte as u32) {
                    Some(c) if !c.is_control() => out.push(c),
                    _ => out.push_str(&format!("\\u{:04x}", byte)),
                }
            }
            out
        }
        Kind::Array => {
            let element = match type_info.element.as_deref() {
                Some(e) => e,
                None => return format!("{}", value),
            };
            if element.kind == Kind::Uint && element.bits == 8 {
                let mask = BigUint::from(0xffu8);
                (0..type_info.array_size)
                    .map(|i| {
                        let byte = (value >> (8 * i)) & &mask;
                        format!("{:02x}", byte)
                    })
                    .collect()
            } else {
                let mask = (BigUint::from(1u8) << element.bits) - 1u8;
                let items: Vec<String> = (0..type_info.array_size)
                    .map(|i| {
                        let v = (value >> (element.bits * i)) & &mask;
                        format_result(&v, element)
                    })
                    .collect();
                format!("[{}]", items.join(" "))
            }
        }
        _ => format!("{}", value),
    }
}

/// Per-op gate histogram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats([usize; Op::COUNT]);

impl Stats {
    pub fn count(&self, op: Op) -> usize {
        self.0[op.code() as usize]
    }

    /// Gates that cost a transmitted table under Free-XOR.
    pub fn garbled(&self) -> usize {
        self.count(Op::And) + self.count(Op::Or) + self.count(Op::Inv)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "XOR={} XNOR={} AND={} OR={} INV={}",
            self.count(Op::Xor),
            self.count(Op::Xnor),
            self.count(Op::And),
            self.count(Op::Or),
            self.count(Op::Inv)
        )
    }
}

/// Per-gate longest-path levels, used to interleave streaming garbling
/// with transmission.
#[derive(Clone, Debug)]
pub struct Levels {
    pub gate_levels: Vec<u32>,
    pub count: u32,
}

/// A compiled circuit. Wire ids are dense in
/// `[0, num_inputs + num_live_gates)`; circuit outputs occupy the final
/// id range and gates are topologically ordered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Circuit {
    pub num_wires: usize,
    /// One input descriptor per party (garbler first, then evaluator).
    pub inputs: Vec<Io>,
    pub outputs: Io,
    pub gates: Vec<Gate>,
    pub stats: Stats,
}

impl Circuit {
    pub fn new(num_wires: usize, inputs: Vec<Io>, outputs: Io, gates: Vec<Gate>) -> Circuit {
        let mut stats = Stats::default();
        for gate in &gates {
            stats.0[gate.op.code() as usize] += 1;
        }
        Circuit {
            num_wires,
            inputs,
            outputs,
            gates,
            stats,
        }
    }

    pub fn num_gates(&self) -> usize {
        self.gates.len()
    }

    /// Total input width over all parties.
    pub fn input_bits(&self) -> u32 {
        self.inputs.iter().map(|io| io.total_bits()).sum()
    }

    pub fn output_bits(&self) -> u32 {
        self.outputs.total_bits()
    }

    /// Bit offset of a party's first input wire.
    pub fn input_offset(&self, party: usize) -> u32 {
        self.inputs[..party].iter().map(|io| io.total_bits()).sum()
    }

    /// Check wire-range and ordering invariants: every gate input is a
    /// circuit input or the output of an earlier gate.
    pub fn verify(&self) -> Result<(), Error> {
        let mut defined = vec![false; self.num_wires];
        for wire in defined.iter_mut().take(self.input_bits() as usize) {
            *wire = true;
        }
        for gate in &self.gates {
            for input in std::iter::once(gate.x).chain(gate.input1()) {
                if input as usize >= self.num_wires || !defined[input as usize] {
                    return Err(Error::InvalidWire(input));
                }
            }
            if gate.z as usize >= self.num_wires {
                return Err(Error::InvalidWire(gate.z));
            }
            defined[gate.z as usize] = true;
        }
        Ok(())
    }

    /// Evaluate the circuit in the clear over the packed input bits of
    /// both parties. Used by compile-time tests and the constant
    /// evaluator's oracle; the garbled protocol never calls this.
    pub fn eval(&self, inputs: &BigUint) -> Result<BigUint, Error> {
        let mut wires = vec![false; self.num_wires];
        for (i, wire) in wires.iter_mut().take(self.input_bits() as usize).enumerate() {
            *wire = inputs.bit(i as u64);
        }
        for gate in &self.gates {
            let a = wires[gate.x as usize];
            let value = match gate.op {
                Op::Xor => a ^ wires[gate.y as usize],
                Op::Xnor => !(a ^ wires[gate.y as usize]),
                Op::And => a & wires[gate.y as usize],
                Op::Or => a | wires[gate.y as usize],
                Op::Inv => !a,
            };
            wires[gate.z as usize] = value;
        }
        let mut out = BigUint::default();
        let base = self.num_wires - self.output_bits() as usize;
        for i in 0..self.output_bits() as usize {
            if wires[base + i] {
                out.set_bit(i as u64, true);
            }
        }
        Ok(out)
    }

    /// Drop gates whose outputs reach no circuit output, renumbering
    /// the surviving wires densely. Running the pruner twice yields the
    /// same circuit on the second call.
    pub fn prune(&self) -> Circuit {
        let input_bits = self.input_bits() as usize;
        let output_bits = self.output_bits() as usize;
        let out_base = self.num_wires - output_bits;

        let mut needed = vec![false; self.num_wires];
        for wire in needed.iter_mut().skip(out_base) {
            *wire = true;
        }
        let mut live = vec![false; self.gates.len()];
        for (idx, gate) in self.gates.iter().enumerate().rev() {
            if !needed[gate.z as usize] {
                continue;
            }
            live[idx] = true;
            needed[gate.x as usize] = true;
            if let Some(y) = gate.input1() {
                needed[y as usize] = true;
            }
        }

        const UNASSIGNED: u32 = u32::MAX;
        let mut ids = vec![UNASSIGNED; self.num_wires];
        let mut next_id = 0u32;
        for id in ids.iter_mut().take(input_bits) {
            *id = next_id;
            next_id += 1;
        }
        for (idx, gate) in self.gates.iter().enumerate() {
            if live[idx] && (gate.z as usize) < out_base {
                ids[gate.z as usize] = next_id;
                next_id += 1;
            }
        }
        for id in ids.iter_mut().skip(out_base) {
            *id = next_id;
            next_id += 1;
        }

        let gates = self
            .gates
            .iter()
            .enumerate()
            .filter(|(idx, _)| live[*idx])
            .map(|(_, gate)| {
                if gate.op.is_unary() {
                    Gate::inv(ids[gate.x as usize], ids[gate.z as usize])
                } else {
                    Gate::binary(
                        gate.op,
                        ids[gate.x as usize],
                        ids[gate.y as usize],
                        ids[gate.z as usize],
                    )
                }
            })
            .collect();
        Circuit::new(
            next_id as usize,
            self.inputs.clone(),
            self.outputs.clone(),
            gates,
        )
    }

    /// Annotate each gate with its longest-path distance from the
    /// circuit inputs.
    pub fn assign_levels(&self) -> Levels {
        let mut wire_levels = vec![0u32; self.num_wires];
        let mut gate_levels = Vec::with_capacity(self.gates.len());
        let mut count = 0;
        for gate in &self.gates {
            let mut level = wire_levels[gate.x as usize];
            if let Some(y) = gate.input1() {
                level = level.max(wire_levels[y as usize]);
            }
            level += 1;
            wire_levels[gate.z as usize] = level;
            gate_levels.push(level);
            count = count.max(level);
        }
        Levels { gate_levels, count }
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "#gates={} (#w={}) {}",
            self.num_gates(),
            self.num_wires,
            self.stats
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adder2() -> Circuit {
        // 1-bit full adder over inputs a, b, cin: sum and carry out.
        let inputs = vec![
            Io(vec![IoArg {
                name: "a".to_string(),
                type_info: TypeInfo::uint(2),
            }]),
            Io(vec![IoArg {
                name: "b".to_string(),
                type_info: TypeInfo::uint(1),
            }]),
        ];
        let outputs = Io(vec![IoArg {
            name: "s".to_string(),
            type_info: TypeInfo::uint(2),
        }]);
        // wires: 0,1 = a; 2 = b; gates feed outputs 5,6.
        let gates = vec![
            Gate::binary(Op::And, 0, 2, 3),
            Gate::binary(Op::Xor, 0, 2, 5),
            Gate::binary(Op::Xor, 1, 3, 6),
            Gate::binary(Op::And, 1, 3, 4),
        ];
        Circuit::new(7, inputs, outputs, gates)
    }

    #[test]
    fn eval_ripple_add() {
        let circ = adder2();
        for a in 0u32..4 {
            for b in 0u32..2 {
                let packed = BigUint::from(a | (b << 2));
                let out = circ.eval(&packed).unwrap();
                let expected = (a + b) % 4;
                assert_eq!(out, BigUint::from(expected), "a={} b={}", a, b);
            }
        }
    }

    #[test]
    fn verify_rejects_use_before_def() {
        let mut circ = adder2();
        circ.gates[0] = Gate::binary(Op::And, 6, 2, 3);
        assert!(circ.verify().is_err());
    }

    #[test]
    fn levels_follow_longest_path() {
        let circ = adder2();
        let levels = circ.assign_levels();
        assert_eq!(levels.gate_levels, vec![1, 1, 2, 2]);
        assert_eq!(levels.count, 2);
    }

    #[test]
    fn prune_drops_dead_gates_and_is_idempotent() {
        let circ = adder2();
        // Gate 3's carry-out feeds nothing.
        let pruned = circ.prune();
        assert_eq!(pruned.num_gates(), 3);
        assert_eq!(pruned.num_wires, circ.num_wires - 1);
        let again = pruned.prune();
        assert_eq!(again, pruned);
        for a in 0u32..4 {
            for b in 0u32..2 {
                let packed = BigUint::from(a | (b << 2));
                assert_eq!(
                    pruned.eval(&packed).unwrap(),
                    circ.eval(&packed).unwrap()
                );
            }
        }
    }

    #[test]
    fn io_parse_and_split() {
        let io = Io(vec![
            IoArg {
                name: "a".to_string(),
                type_info: TypeInfo::uint(8),
            },
            IoArg {
                name: "b".to_string(),
                type_info: TypeInfo::uint(8),
            },
        ]);
        let packed = io
            .parse(&["0x12".to_string(), "52".to_string()])
            .unwrap();
        let parts = io.split(&packed);
        assert_eq!(parts[0], BigUint::from(0x12u8));
        assert_eq!(parts[1], BigUint::from(52u8));
    }

    #[test]
    fn io_parse_negative_int() {
        let io = Io(vec![IoArg {
            name: "a".to_string(),
            type_info: TypeInfo::int(8),
        }]);
        let packed = io.parse(&["-1".to_string()]).unwrap();
        assert_eq!(packed, BigUint::from(0xffu8));
    }

    #[test]
    fn io_parse_hex_blob() {
        let io = Io(vec![IoArg {
            name: "key".to_string(),
            type_info: TypeInfo::array(TypeInfo::uint(8), 4),
        }]);
        let packed = io.parse(&["0xdeadbeef".to_string()]).unwrap();
        // First byte of the blob sits at bit offset 0.
        assert_eq!(packed, BigUint::from(0xefbeaddeu32));
    }
}
