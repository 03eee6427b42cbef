//! Bristol-style textual circuit format, for interop with other
//! garbled-circuit tooling.

use std::io::{BufRead, Write};

use crate::circuit::{Circuit, Gate, Io, IoArg, Op};
use crate::types::TypeInfo;
use crate::Error;

pub fn write<W: Write>(circuit: &Circuit, w: &mut W) -> Result<(), Error> {
    writeln!(w, "{} {}", circuit.num_gates(), circuit.num_wires)?;
    write!(w, "{}", circuit.inputs.len())?;
    for io in &circuit.inputs {
        write!(w, " {}", io.total_bits())?;
    }
    writeln!(w)?;
    writeln!(w, "1 {}", circuit.output_bits())?;
    writeln!(w)?;
    for gate in &circuit.gates {
        match gate.input1() {
            Some(y) => writeln!(w, "2 1 {} {} {} {}", gate.x, y, gate.z, gate.op)?,
            None => writeln!(w, "1 1 {} {} {}", gate.x, gate.z, gate.op)?,
        }
    }
    Ok(())
}

pub fn read<R: BufRead>(r: &mut R) -> Result<Circuit, Error> {
    let mut lines = Lines::new(r);

    let header = lines.next_non_empty()?;
    let mut tokens = header.split_whitespace();
    let num_gates: usize = next_token(&mut tokens, "gate count")?.parse()?;
    let num_wires: usize = next_token(&mut tokens, "wire count")?.parse()?;

    let input_line = lines.next_non_empty()?;
    let mut tokens = input_line.split_whitespace();
    let num_parties: usize = next_token(&mut tokens, "input count")?.parse()?;
    let mut inputs = Vec::with_capacity(num_parties);
    for i in 0..num_parties {
        let bits: u32 = next_token(&mut tokens, "input width")?.parse()?;
        inputs.push(Io(vec![IoArg {
            name: format!("in{}", i),
            type_info: TypeInfo::uint(bits),
        }]));
    }

    let output_line = lines.next_non_empty()?;
    let mut tokens = output_line.split_whitespace();
    let num_outputs: usize = next_token(&mut tokens, "output count")?.parse()?;
    let mut output_args = Vec::with_capacity(num_outputs);
    for i in 0..num_outputs {
        let bits: u32 = next_token(&mut tokens, "output width")?.parse()?;
        output_args.push(IoArg {
            name: format!("out{}", i),
            type_info: TypeInfo::uint(bits),
        });
    }

    let mut gates = Vec::with_capacity(num_gates);
    for _ in 0..num_gates {
        let line = lines.next_non_empty()?;
        gates.push(parse_gate(&line)?);
    }

    let circuit = Circuit::new(num_wires, inputs, Io(output_args), gates);
    circuit.verify()?;
    Ok(circuit)
}

fn parse_gate(line: &str) -> Result<Gate, Error> {
    let mut tokens = line.split_whitespace();
    let n_in: usize = next_token(&mut tokens, "gate input arity")?.parse()?;
    let n_out: usize = next_token(&mut tokens, "gate output arity")?.parse()?;
    if n_out != 1 {
        return Err(Error::Parse(format!("gate output arity {}", n_out)));
    }
    let op_name = line
        .split_whitespace()
        .next_back()
        .ok_or_else(|| Error::Parse("missing gate kind".to_string()))?;
    let op = match op_name {
        "XOR" => Op::Xor,
        "XNOR" => Op::Xnor,
        "AND" => Op::And,
        "OR" => Op::Or,
        "INV" | "NOT" => Op::Inv,
        other => return Err(Error::Parse(format!("unknown gate kind '{}'", other))),
    };
    match (op.is_unary(), n_in) {
        (true, 1) => {
            let x: u32 = next_token(&mut tokens, "gate input")?.parse()?;
            let z: u32 = next_token(&mut tokens, "gate output")?.parse()?;
            Ok(Gate::inv(x, z))
        }
        (false, 2) => {
            let x: u32 = next_token(&mut tokens, "gate input")?.parse()?;
            let y: u32 = next_token(&mut tokens, "gate input")?.parse()?;
            let z: u32 = next_token(&mut tokens, "gate output")?.parse()?;
            Ok(Gate::binary(op, x, y, z))
        }
        _ => Err(Error::Parse(format!(
            "gate input arity {} for {}",
            n_in, op_name
        ))),
    }
}

fn next_token<'a>(
    tokens: &mut std::str::SplitWhitespace<'a>,
    what: &str,
) -> Result<&'a str, Error> {
    tokens
        .next()
        .ok_or_else(|| Error::Parse(format!("unexpected end of line, expected {}", what)))
}

struct Lines<'a, R: BufRead> {
    reader: &'a mut R,
    line: String,
}

impl<'a, R: BufRead> Lines<'a, R> {
    fn new(reader: &'a mut R) -> Self {
        Lines {
            reader,
            line: String::new(),
        }
    }

    fn next_non_empty(&mut self) -> Result<String, Error> {
        loop {
            self.line.clear();
            let n = self.reader.read_line(&mut self.line)?;
            if n == 0 {
                return Err(Error::Parse("unexpected end of file".to_string()));
            }
            if !self.line.trim().is_empty() {
                return Ok(self.line.trim().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Circuit {
        let inputs = vec![
            Io(vec![IoArg {
                name: "a".to_string(),
                type_info: TypeInfo::uint(2),
            }]),
            Io(vec![IoArg {
                name: "b".to_string(),
                type_info: TypeInfo::uint(2),
            }]),
        ];
        let outputs = Io(vec![IoArg {
            name: "out".to_string(),
            type_info: TypeInfo::uint(2),
        }]);
        let gates = vec![
            Gate::binary(Op::Xor, 0, 2, 6),
            Gate::inv(1, 4),
            Gate::binary(Op::And, 4, 3, 5),
            Gate::binary(Op::Xnor, 5, 0, 7),
        ];
        Circuit::new(8, inputs, outputs, gates)
    }

    #[test]
    fn write_then_read() {
        let circuit = sample();
        let mut buf = Vec::new();
        write(&circuit, &mut buf).unwrap();
        let parsed = read(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed.num_gates(), circuit.num_gates());
        assert_eq!(parsed.num_wires, circuit.num_wires);
        assert_eq!(parsed.gates, circuit.gates);
        assert_eq!(parsed.input_bits(), circuit.input_bits());
        assert_eq!(parsed.output_bits(), circuit.output_bits());
    }

    #[test]
    fn rejects_unknown_gate() {
        let text = "1 3\n2 1 1\n1 1\n\n2 1 0 1 2 NAND\n";
        assert!(read(&mut text.as_bytes()).is_err());
    }
}
