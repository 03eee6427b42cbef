//! The two-party garbling session.
//!
//! A session begins with a version handshake and an IO schema exchange
//! so both sides agree on the bit layout before any labels flow. Input
//! labels always precede gate tables; the gate stream follows the
//! circuit's topological gate order. In streaming mode the garbler also
//! transmits the gate descriptors themselves, level by level with a
//! flush after each level, so the evaluator needs no circuit file.

use mpcl_circuit::{Circuit, Gate, Op};
use mpcl_core::{Channel, Label};
use mpcl_ot::{Receiver as OtReceiver, Sender as OtSender};
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};

use crate::{Error, Evaluator, Garbler, Phase};

/// Session magic, "mpcg".
pub const MAGIC: u32 = 0x6d70_6367;
/// Protocol version.
pub const VERSION: u32 = 1;

struct Schema {
    garbler_bits: u32,
    evaluator_bits: u32,
    output_widths: Vec<u32>,
    /// Gate and wire counts; present in streaming mode only.
    counts: Option<(u32, u32)>,
}

impl Schema {
    fn of(circuit: &Circuit, stream: bool) -> Result<Schema, Error> {
        if circuit.inputs.len() != 2 {
            return Err(Error::protocol(
                Phase::Setup,
                format!(
                    "invalid circuit for 2-party computation: {} parties",
                    circuit.inputs.len()
                ),
            ));
        }
        Ok(Schema {
            garbler_bits: circuit.inputs[0].total_bits(),
            evaluator_bits: circuit.inputs[1].total_bits(),
            output_widths: circuit.outputs.0.iter().map(|arg| arg.bits()).collect(),
            counts: if stream {
                Some((circuit.num_gates() as u32, circuit.num_wires as u32))
            } else {
                None
            },
        })
    }

    fn output_bits(&self) -> u32 {
        self.output_widths.iter().sum()
    }

    fn write<C: Channel>(&self, channel: &mut C) -> Result<(), Error> {
        channel.write_u32(MAGIC)?;
        channel.write_u32(VERSION)?;
        channel.write_u8(self.counts.is_some() as u8)?;
        channel.write_u32(self.garbler_bits)?;
        channel.write_u32(self.evaluator_bits)?;
        channel.write_u32(self.output_widths.len() as u32)?;
        for width in &self.output_widths {
            channel.write_u32(*width)?;
        }
        if let Some((gates, wires)) = self.counts {
            channel.write_u32(gates)?;
            channel.write_u32(wires)?;
        }
        channel.flush()?;
        Ok(())
    }

    fn read<C: Channel>(channel: &mut C, stream: bool) -> Result<Schema, Error> {
        let magic = channel.read_u32()?;
        if magic != MAGIC {
            return Err(Error::protocol(
                Phase::Setup,
                format!("bad magic 0x{:08x}", magic),
            ));
        }
        let version = channel.read_u32()?;
        if version != VERSION {
            return Err(Error::protocol(
                Phase::Setup,
                format!("unsupported version {}", version),
            ));
        }
        let peer_stream = channel.read_u8()? != 0;
        if peer_stream != stream {
            return Err(Error::protocol(
                Phase::Setup,
                "streaming mode mismatch with peer",
            ));
        }
        let garbler_bits = channel.read_u32()?;
        let evaluator_bits = channel.read_u32()?;
        let num_outputs = channel.read_u32()? as usize;
        let mut output_widths = Vec::with_capacity(num_outputs);
        for _ in 0..num_outputs {
            output_widths.push(channel.read_u32()?);
        }
        let counts = if stream {
            let gates = channel.read_u32()?;
            let wires = channel.read_u32()?;
            Some((gates, wires))
        } else {
            None
        };
        Ok(Schema {
            garbler_bits,
            evaluator_bits,
            output_widths,
            counts,
        })
    }

    fn matches(&self, other: &Schema) -> bool {
        self.garbler_bits == other.garbler_bits
            && self.evaluator_bits == other.evaluator_bits
            && self.output_widths == other.output_widths
    }
}

fn split_outputs(combined: &BigUint, widths: &[u32]) -> Vec<BigUint> {
    let mut results = Vec::with_capacity(widths.len());
    let mut offset = 0u32;
    for width in widths {
        let mask = (BigUint::from(1u8) << width) - 1u8;
        results.push((combined >> offset) & mask);
        offset += width;
    }
    results
}

/// Run a session as the garbler. Returns the decoded outputs, which
/// the evaluator reports back so both parties learn them.
pub fn garble<C, OT, RNG>(
    circuit: &Circuit,
    inputs: &BigUint,
    channel: &mut C,
    rng: &mut RNG,
) -> Result<Vec<BigUint>, Error>
where
    C: Channel,
    OT: OtSender,
    RNG: CryptoRng + RngCore,
{
    let schema = Schema::of(circuit, false)?;
    schema.write(channel)?;
    expect_ack(channel)?;

    let mut garbler = Garbler::new(circuit.num_wires, rng);
    send_inputs(&mut garbler, &schema, inputs, channel, rng)?;
    run_ot_sender::<C, OT, RNG>(&mut garbler, &schema, channel, rng)?;

    for (idx, gate) in circuit.gates.iter().enumerate() {
        let table = garbler.garble_gate(gate, idx as u32, rng);
        for row in &table {
            channel.write_label(row)?;
        }
    }
    channel.flush()?;
    log::debug!(
        "garbled {} gates ({} tables)",
        circuit.num_gates(),
        circuit.stats.garbled()
    );

    send_decode_bits(&garbler, circuit.num_wires, &schema, channel)?;
    let result = receive_result(channel)?;
    Ok(split_outputs(&result, &schema.output_widths))
}

/// Run a session as the evaluator, using the shared circuit file.
pub fn evaluate<C, OT, RNG>(
    circuit: &Circuit,
    inputs: &BigUint,
    channel: &mut C,
    rng: &mut RNG,
) -> Result<Vec<BigUint>, Error>
where
    C: Channel,
    OT: OtReceiver,
    RNG: CryptoRng + RngCore,
{
    let peer_schema = Schema::read(channel, false)?;
    let schema = Schema::of(circuit, false)?;
    if !schema.matches(&peer_schema) {
        channel.write_u32(0)?;
        channel.flush()?;
        return Err(Error::protocol(
            Phase::Setup,
            "circuit IO schema differs from peer",
        ));
    }
    channel.write_u32(1)?;
    channel.flush()?;

    let mut evaluator = Evaluator::new(circuit.num_wires);
    receive_inputs(&mut evaluator, &schema, channel)?;
    run_ot_receiver::<C, OT, RNG>(&mut evaluator, &schema, inputs, channel, rng)?;

    for (idx, gate) in circuit.gates.iter().enumerate() {
        let table = channel.read_labels(Evaluator::table_rows(gate.op))?;
        evaluator.eval_gate(gate, idx as u32, &table)?;
    }

    let result = decode_and_report(&evaluator, circuit.num_wires, &schema, channel)?;
    Ok(split_outputs(&result, &schema.output_widths))
}

/// Run a streaming session as the garbler: gate descriptors and tables
/// are interleaved level by level, with a flush marking each level
/// boundary.
pub fn garble_stream<C, OT, RNG>(
    circuit: &Circuit,
    inputs: &BigUint,
    channel: &mut C,
    rng: &mut RNG,
) -> Result<Vec<BigUint>, Error>
where
    C: Channel,
    OT: OtSender,
    RNG: CryptoRng + RngCore,
{
    let schema = Schema::of(circuit, true)?;
    schema.write(channel)?;
    expect_ack(channel)?;

    let mut garbler = Garbler::new(circuit.num_wires, rng);
    send_inputs(&mut garbler, &schema, inputs, channel, rng)?;
    run_ot_sender::<C, OT, RNG>(&mut garbler, &schema, channel, rng)?;

    // Interleave garbling with transmission along the level order; the
    // gate id counts along the stream on both sides.
    let levels = circuit.assign_levels();
    let mut by_level: Vec<Vec<usize>> = vec![Vec::new(); levels.count as usize + 1];
    for (idx, level) in levels.gate_levels.iter().enumerate() {
        by_level[*level as usize].push(idx);
    }
    let mut stream_id = 0u32;
    for level in by_level.iter().filter(|level| !level.is_empty()) {
        channel.write_u32(level.len() as u32)?;
        for &idx in level {
            let gate = &circuit.gates[idx];
            channel.write_u8(gate.op.code())?;
            channel.write_u32(gate.x)?;
            if let Some(y) = gate.input1() {
                channel.write_u32(y)?;
            }
            channel.write_u32(gate.z)?;
            let table = garbler.garble_gate(gate, stream_id, rng);
            stream_id += 1;
            for row in &table {
                channel.write_label(row)?;
            }
        }
        channel.flush()?;
    }

    send_decode_bits(&garbler, circuit.num_wires, &schema, channel)?;
    let result = receive_result(channel)?;
    Ok(split_outputs(&result, &schema.output_widths))
}

/// Run a streaming session as the evaluator. The circuit arrives over
/// the wire; returns the decoded outputs together with their widths.
pub fn evaluate_stream<C, OT, RNG>(
    inputs: &BigUint,
    channel: &mut C,
    rng: &mut RNG,
) -> Result<(Vec<BigUint>, Vec<u32>), Error>
where
    C: Channel,
    OT: OtReceiver,
    RNG: CryptoRng + RngCore,
{
    let schema = Schema::read(channel, true)?;
    let (num_gates, num_wires) = schema.counts.unwrap();
    channel.write_u32(1)?;
    channel.flush()?;

    let mut evaluator = Evaluator::new(num_wires as usize);
    receive_inputs(&mut evaluator, &schema, channel)?;
    run_ot_receiver::<C, OT, RNG>(&mut evaluator, &schema, inputs, channel, rng)?;

    let mut processed = 0u32;
    while processed < num_gates {
        let count = channel.read_u32()?;
        if count == 0 || processed + count > num_gates {
            return Err(Error::protocol(
                Phase::Gates,
                format!("invalid level of {} gates at {}/{}", count, processed, num_gates),
            ));
        }
        for _ in 0..count {
            let op = Op::from_code(channel.read_u8()?)
                .map_err(|e| Error::protocol(Phase::Gates, e.to_string()))?;
            let x = channel.read_u32()?;
            let gate = if op.is_unary() {
                let z = channel.read_u32()?;
                Gate::inv(x, z)
            } else {
                let y = channel.read_u32()?;
                let z = channel.read_u32()?;
                Gate::binary(op, x, y, z)
            };
            if gate.z >= num_wires {
                return Err(Error::protocol(
                    Phase::Gates,
                    format!("wire {} out of range", gate.z),
                ));
            }
            let table = channel.read_labels(Evaluator::table_rows(gate.op))?;
            evaluator.eval_gate(&gate, processed, &table)?;
            processed += 1;
        }
    }

    let result = decode_and_report(&evaluator, num_wires as usize, &schema, channel)?;
    let values = split_outputs(&result, &schema.output_widths);
    Ok((values, schema.output_widths))
}

fn expect_ack<C: Channel>(channel: &mut C) -> Result<(), Error> {
    let ack = channel.read_u32()?;
    if ack != 1 {
        return Err(Error::protocol(Phase::Setup, "peer rejected IO schema"));
    }
    Ok(())
}

/// Send the garbler's own input labels in the clear.
fn send_inputs<C: Channel, RNG: CryptoRng + RngCore>(
    garbler: &mut Garbler,
    schema: &Schema,
    inputs: &BigUint,
    channel: &mut C,
    rng: &mut RNG,
) -> Result<(), Error> {
    for wire in 0..schema.garbler_bits {
        let label = garbler.encode(wire, inputs.bit(wire as u64), rng);
        channel.write_label(&label)?;
    }
    Ok(())
}

fn receive_inputs<C: Channel>(
    evaluator: &mut Evaluator,
    schema: &Schema,
    channel: &mut C,
) -> Result<(), Error> {
    for wire in 0..schema.garbler_bits {
        let label = channel.read_label()?;
        evaluator.set_label(wire, label);
    }
    Ok(())
}

/// One OT instance per evaluator input bit, messages `(L0, L1)`.
fn run_ot_sender<C, OT, RNG>(
    garbler: &mut Garbler,
    schema: &Schema,
    channel: &mut C,
    rng: &mut RNG,
) -> Result<(), Error>
where
    C: Channel,
    OT: OtSender,
    RNG: CryptoRng + RngCore,
{
    let mut sender = OT::init(channel, rng)?;
    let pairs: Vec<(Label, Label)> = (schema.garbler_bits
        ..schema.garbler_bits + schema.evaluator_bits)
        .map(|wire| garbler.encode_pair(wire, rng))
        .collect();
    sender.send(channel, &pairs, rng)?;
    Ok(())
}

fn run_ot_receiver<C, OT, RNG>(
    evaluator: &mut Evaluator,
    schema: &Schema,
    inputs: &BigUint,
    channel: &mut C,
    rng: &mut RNG,
) -> Result<(), Error>
where
    C: Channel,
    OT: OtReceiver,
    RNG: CryptoRng + RngCore,
{
    let mut receiver = OT::init(channel, rng)?;
    let choices: Vec<bool> = (0..schema.evaluator_bits)
        .map(|i| inputs.bit(i as u64))
        .collect();
    let labels = receiver.receive(channel, &choices, rng)?;
    if labels.len() != schema.evaluator_bits as usize {
        return Err(Error::protocol(
            Phase::Ot,
            format!(
                "bad OT count: got {} labels for {} input bits",
                labels.len(),
                schema.evaluator_bits
            ),
        ));
    }
    for (i, label) in labels.into_iter().enumerate() {
        evaluator.set_label(schema.garbler_bits + i as u32, label);
    }
    Ok(())
}

/// Transmit the truth-of-zero permute bit of every output wire.
fn send_decode_bits<C: Channel>(
    garbler: &Garbler,
    num_wires: usize,
    schema: &Schema,
    channel: &mut C,
) -> Result<(), Error> {
    let base = num_wires - schema.output_bits() as usize;
    for i in 0..schema.output_bits() as usize {
        channel.write_bool(garbler.decode_bit((base + i) as u32))?;
    }
    channel.flush()?;
    Ok(())
}

fn decode_and_report<C: Channel>(
    evaluator: &Evaluator,
    num_wires: usize,
    schema: &Schema,
    channel: &mut C,
) -> Result<BigUint, Error> {
    let base = num_wires - schema.output_bits() as usize;
    let mut result = BigUint::default();
    for i in 0..schema.output_bits() as usize {
        let truth_of_zero = channel.read_bool()?;
        if evaluator.decode((base + i) as u32, truth_of_zero)? {
            result.set_bit(i as u64, true);
        }
    }
    channel.write_data(&result.to_bytes_le())?;
    channel.flush()?;
    Ok(result)
}

fn receive_result<C: Channel>(channel: &mut C) -> Result<BigUint, Error> {
    let data = channel.read_data()?;
    Ok(BigUint::from_bytes_le(&data))
}
