//! The garbler side: label assignment and gate-table encryption.

use mpcl_circuit::{Gate, Op};
use mpcl_core::{GarbleCipher, Label};
use rand::{CryptoRng, RngCore};

/// Garbles one circuit. Holds the session-global offset `R` (never
/// serialized) and the zero label of every assigned wire; `L1` is
/// always `L0 ^ R`.
pub struct Garbler {
    delta: Label,
    labels: Vec<Option<Label>>,
    cipher: GarbleCipher,
}

impl Garbler {
    /// Set up a garbler over `num_wires` wires, sampling a fresh `R`
    /// with its permute bit forced to 1.
    pub fn new<R: CryptoRng + RngCore>(num_wires: usize, rng: &mut R) -> Garbler {
        Garbler {
            delta: Label::random_delta(rng),
            labels: vec![None; num_wires],
            cipher: GarbleCipher::new(),
        }
    }

    /// The zero label of a wire, sampled on first use.
    fn zero_label<R: CryptoRng + RngCore>(&mut self, wire: u32, rng: &mut R) -> Label {
        if let Some(label) = self.labels[wire as usize] {
            return label;
        }
        let label = Label::random(rng);
        self.labels[wire as usize] = Some(label);
        label
    }

    /// The label carrying `bit` on `wire`.
    pub fn encode<R: CryptoRng + RngCore>(
        &mut self,
        wire: u32,
        bit: bool,
        rng: &mut R,
    ) -> Label {
        let zero = self.zero_label(wire, rng);
        if bit {
            zero ^ self.delta
        } else {
            zero
        }
    }

    /// The `(L0, L1)` pair of a wire, used as the OT messages for the
    /// evaluator's input bits.
    pub fn encode_pair<R: CryptoRng + RngCore>(
        &mut self,
        wire: u32,
        rng: &mut R,
    ) -> (Label, Label) {
        let zero = self.zero_label(wire, rng);
        (zero, zero ^ self.delta)
    }

    /// Garble one gate. Free gates return no table; AND/OR return four
    /// ciphertext rows and INV two, ordered by the point-and-permute
    /// index of the input labels.
    pub fn garble_gate<R: CryptoRng + RngCore>(
        &mut self,
        gate: &Gate,
        gate_id: u32,
        rng: &mut R,
    ) -> Vec<Label> {
        match gate.op {
            Op::Xor => {
                let a = self.zero_label(gate.x, rng);
                let b = self.zero_label(gate.y, rng);
                self.labels[gate.z as usize] = Some(a ^ b);
                Vec::new()
            }
            Op::Xnor => {
                // Free-XOR with the output flipped by R; the evaluator
                // computes a plain XOR of its labels.
                let a = self.zero_label(gate.x, rng);
                let b = self.zero_label(gate.y, rng);
                self.labels[gate.z as usize] = Some(a ^ b ^ self.delta);
                Vec::new()
            }
            Op::Inv => {
                let a0 = self.zero_label(gate.x, rng);
                let a1 = a0 ^ self.delta;
                let out0 = self.zero_label(gate.z, rng);
                let out1 = out0 ^ self.delta;
                let mut table = vec![Label::ZERO; 2];
                table[a0.s() as usize] = self.cipher.encrypt(a0, None, gate_id, out1);
                table[a1.s() as usize] = self.cipher.encrypt(a1, None, gate_id, out0);
                table
            }
            Op::And | Op::Or => {
                let a0 = self.zero_label(gate.x, rng);
                let b0 = self.zero_label(gate.y, rng);
                let out0 = self.zero_label(gate.z, rng);
                let mut table = vec![Label::ZERO; 4];
                for bit_a in 0..2u8 {
                    for bit_b in 0..2u8 {
                        let truth = match gate.op {
                            Op::And => bit_a == 1 && bit_b == 1,
                            _ => bit_a == 1 || bit_b == 1,
                        };
                        let la = if bit_a == 1 { a0 ^ self.delta } else { a0 };
                        let lb = if bit_b == 1 { b0 ^ self.delta } else { b0 };
                        let out = if truth { out0 ^ self.delta } else { out0 };
                        let index = ((la.s() as usize) << 1) | lb.s() as usize;
                        table[index] = self.cipher.encrypt(la, Some(lb), gate_id, out);
                    }
                }
                table
            }
        }
    }

    /// The decode bit of an output wire: the permute bit of its zero
    /// label. The evaluator recovers the cleartext bit as
    /// `S(held) ^ S(L0)`.
    pub fn decode_bit(&self, wire: u32) -> bool {
        self.labels[wire as usize]
            .map(|label| label.s())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn free_xor_invariant() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut garbler = Garbler::new(8, &mut rng);
        for wire in 0..8u32 {
            let (l0, l1) = garbler.encode_pair(wire, &mut rng);
            assert_eq!(l0 ^ l1, garbler.delta);
            assert_ne!(l0.s(), l1.s());
        }
        assert!(garbler.delta.s());
    }

    #[test]
    fn xnor_output_is_flipped_xor() {
        let mut rng = StdRng::seed_from_u64(22);
        let mut garbler = Garbler::new(3, &mut rng);
        let gate = Gate::binary(Op::Xnor, 0, 1, 2);
        garbler.garble_gate(&gate, 0, &mut rng);
        let a = garbler.labels[0].unwrap();
        let b = garbler.labels[1].unwrap();
        let out = garbler.labels[2].unwrap();
        // The evaluator computes a ^ b; for equal inputs that label
        // must decode as 1.
        assert_eq!(a ^ b, out ^ garbler.delta);
    }
}
