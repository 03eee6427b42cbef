//! The evaluator side: one label per wire, one decrypted row per
//! garbled gate.

use mpcl_circuit::{Gate, Op};
use mpcl_core::{GarbleCipher, Label};

use crate::{Error, Phase};

/// Evaluates a garbled circuit. The evaluator never holds `R`; XOR and
/// XNOR gates are both plain label XORs (the garbler flips the XNOR
/// output labels).
pub struct Evaluator {
    labels: Vec<Option<Label>>,
    cipher: GarbleCipher,
}

impl Evaluator {
    pub fn new(num_wires: usize) -> Evaluator {
        Evaluator {
            labels: vec![None; num_wires],
            cipher: GarbleCipher::new(),
        }
    }

    /// Install an input-wire label received from the garbler or via
    /// oblivious transfer.
    pub fn set_label(&mut self, wire: u32, label: Label) {
        if let Some(slot) = self.labels.get_mut(wire as usize) {
            *slot = Some(label);
        }
    }

    fn label(&self, wire: u32) -> Result<Label, Error> {
        self.labels
            .get(wire as usize)
            .copied()
            .flatten()
            .ok_or_else(|| Error::protocol(Phase::Gates, format!("no label for wire {}", wire)))
    }

    /// The number of table rows transmitted for a gate.
    pub fn table_rows(op: Op) -> usize {
        match op {
            Op::Xor | Op::Xnor => 0,
            Op::Inv => 2,
            Op::And | Op::Or => 4,
        }
    }

    /// Process one gate; `table` holds exactly
    /// [`Evaluator::table_rows`] rows.
    pub fn eval_gate(&mut self, gate: &Gate, gate_id: u32, table: &[Label]) -> Result<(), Error> {
        if table.len() != Self::table_rows(gate.op) {
            return Err(Error::protocol(
                Phase::Gates,
                format!(
                    "gate {}: expected {} table rows, got {}",
                    gate_id,
                    Self::table_rows(gate.op),
                    table.len()
                ),
            ));
        }
        let out = match gate.op {
            Op::Xor | Op::Xnor => {
                let a = self.label(gate.x)?;
                let b = self.label(gate.y)?;
                a ^ b
            }
            Op::Inv => {
                let a = self.label(gate.x)?;
                self.cipher.decrypt(a, None, gate_id, table[a.s() as usize])
            }
            Op::And | Op::Or => {
                let a = self.label(gate.x)?;
                let b = self.label(gate.y)?;
                let index = ((a.s() as usize) << 1) | b.s() as usize;
                self.cipher.decrypt(a, Some(b), gate_id, table[index])
            }
        };
        match self.labels.get_mut(gate.z as usize) {
            Some(slot) => *slot = Some(out),
            None => {
                return Err(Error::protocol(
                    Phase::Gates,
                    format!("gate {}: output wire {} out of range", gate_id, gate.z),
                ))
            }
        }
        Ok(())
    }

    /// Decode an output wire with the garbler's truth-of-zero bit.
    pub fn decode(&self, wire: u32, truth_of_zero: bool) -> Result<bool, Error> {
        let label = self.labels.get(wire as usize).copied().flatten().ok_or_else(|| {
            Error::protocol(Phase::Decode, format!("no label for output wire {}", wire))
        })?;
        Ok(label.s() ^ truth_of_zero)
    }
}
