//! The compact `mpclc` binary circuit format. This is the source of
//! truth for round-trip serialization.

use std::io::{Read, Write};

use crate::circuit::{Circuit, Gate, Io, IoArg, Op};
use crate::types::{Kind, StructField, TypeInfo};
use crate::Error;

/// File magic, "mpcl".
pub const MAGIC: u32 = 0x6d70_636c;
/// Format version.
pub const VERSION: u32 = 1;

pub fn write<W: Write>(circuit: &Circuit, w: &mut W) -> Result<(), Error> {
    write_u32(w, MAGIC)?;
    write_u32(w, VERSION)?;
    write_u32(w, circuit.inputs.len() as u32)?;
    for io in &circuit.inputs {
        write_io(w, io)?;
    }
    write_io(w, &circuit.outputs)?;
    write_u32(w, circuit.num_gates() as u32)?;
    write_u32(w, circuit.num_wires as u32)?;
    for gate in &circuit.gates {
        w.write_all(&[gate.op.code()])?;
        write_u32(w, gate.x)?;
        if let Some(y) = gate.input1() {
            write_u32(w, y)?;
        }
        write_u32(w, gate.z)?;
    }
    Ok(())
}

pub fn read<R: Read>(r: &mut R) -> Result<Circuit, Error> {
    let magic = read_u32(r)?;
    if magic != MAGIC {
        return Err(Error::Parse(format!("bad magic 0x{:08x}", magic)));
    }
    let version = read_u32(r)?;
    if version != VERSION {
        return Err(Error::Parse(format!("unsupported version {}", version)));
    }
    let num_parties = read_u32(r)? as usize;
    let mut inputs = Vec::with_capacity(num_parties);
    for _ in 0..num_parties {
        inputs.push(read_io(r)?);
    }
    let outputs = read_io(r)?;
    let num_gates = read_u32(r)? as usize;
    let num_wires = read_u32(r)? as usize;
    let mut gates = Vec::with_capacity(num_gates);
    for _ in 0..num_gates {
        let mut code = [0u8; 1];
        r.read_exact(&mut code)?;
        let op = Op::from_code(code[0])?;
        let x = read_u32(r)?;
        let gate = if op.is_unary() {
            let z = read_u32(r)?;
            Gate::inv(x, z)
        } else {
            let y = read_u32(r)?;
            let z = read_u32(r)?;
            Gate::binary(op, x, y, z)
        };
        gates.push(gate);
    }
    let circuit = Circuit::new(num_wires, inputs, outputs, gates);
    circuit.verify()?;
    Ok(circuit)
}

fn write_io<W: Write>(w: &mut W, io: &Io) -> Result<(), Error> {
    write_u32(w, io.0.len() as u32)?;
    for arg in &io.0 {
        write_string(w, &arg.name)?;
        write_type(w, &arg.type_info)?;
    }
    Ok(())
}

fn read_io<R: Read>(r: &mut R) -> Result<Io, Error> {
    let count = read_u32(r)? as usize;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_string(r)?;
        let type_info = read_type(r)?;
        args.push(IoArg { name, type_info });
    }
    Ok(Io(args))
}

fn kind_code(kind: Kind) -> u8 {
    match kind {
        Kind::Undefined => 0,
        Kind::Bool => 1,
        Kind::Int => 2,
        Kind::Uint => 3,
        Kind::String => 4,
        Kind::Array => 5,
        Kind::Struct => 6,
    }
}

fn write_type<W: Write>(w: &mut W, t: &TypeInfo) -> Result<(), Error> {
    w.write_all(&[kind_code(t.kind)])?;
    write_u32(w, t.bits)?;
    match t.kind {
        Kind::Array => {
            write_u32(w, t.array_size)?;
            let element = t
                .element
                .as_deref()
                .ok_or_else(|| Error::Parse("array without element type".to_string()))?;
            write_type(w, element)?;
        }
        Kind::Struct => {
            write_u32(w, t.fields.len() as u32)?;
            for field in &t.fields {
                write_string(w, &field.name)?;
                write_u32(w, field.offset)?;
                write_type(w, &field.type_info)?;
            }
        }
        _ => (),
    }
    Ok(())
}

fn read_type<R: Read>(r: &mut R) -> Result<TypeInfo, Error> {
    let mut code = [0u8; 1];
    r.read_exact(&mut code)?;
    let bits = read_u32(r)?;
    let t = match code[0] {
        0 => TypeInfo::undefined(),
        1 => TypeInfo::bool(),
        2 => TypeInfo::int(bits),
        3 => TypeInfo::uint(bits),
        4 => TypeInfo::string(bits / 8),
        5 => {
            let count = read_u32(r)?;
            let element = read_type(r)?;
            TypeInfo::array(element, count)
        }
        6 => {
            let count = read_u32(r)? as usize;
            let mut fields = Vec::with_capacity(count);
            for _ in 0..count {
                let name = read_string(r)?;
                let _offset = read_u32(r)?;
                let type_info = read_type(r)?;
                fields.push((name, type_info));
            }
            TypeInfo::structure(fields)
        }
        c => return Err(Error::Parse(format!("invalid type kind {}", c))),
    };
    if t.bits != bits {
        return Err(Error::Parse(format!(
            "type width mismatch: {} declared {}",
            t, bits
        )));
    }
    Ok(t)
}

fn write_u32<W: Write>(w: &mut W, x: u32) -> Result<(), Error> {
    w.write_all(&x.to_le_bytes())?;
    Ok(())
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, Error> {
    let mut data = [0u8; 4];
    r.read_exact(&mut data)?;
    Ok(u32::from_le_bytes(data))
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<(), Error> {
    write_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string<R: Read>(r: &mut R) -> Result<String, Error> {
    let len = read_u32(r)? as usize;
    let mut data = vec![0u8; len];
    r.read_exact(&mut data)?;
    String::from_utf8(data).map_err(|_| Error::Parse("invalid utf-8 in name".to_string()))
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
            Gate::binary(Op::Or, 5, 0, 7),
        ];
        Circuit::new(8, inputs, outputs, gates)
    }

    #[test]
    fn round_trip() {
        let circuit = sample();
        let mut buf = Vec::new();
        write(&circuit, &mut buf).unwrap();
        let parsed = read(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed, circuit);
    }

    #[test]
    fn round_trip_composite_types() {
        let mut circuit = sample();
        circuit.inputs[0].0[0].type_info = TypeInfo::array(TypeInfo::uint(1), 2);
        circuit.outputs.0[0].type_info = TypeInfo::structure(vec![
            ("lo".to_string(), TypeInfo::uint(1)),
            ("hi".to_string(), TypeInfo::uint(1)),
        ]);
        let mut buf = Vec::new();
        write(&circuit, &mut buf).unwrap();
        let parsed = read(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed, circuit);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = Vec::new();
        write(&sample(), &mut buf).unwrap();
        buf[0] ^= 0xff;
        assert!(read(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn deterministic_bytes() {
        let circuit = sample();
        let mut a = Vec::new();
        let mut b = Vec::new();
        write(&circuit, &mut a).unwrap();
        write(&circuit, &mut b).unwrap();
        assert_eq!(a, b);
    }
}
