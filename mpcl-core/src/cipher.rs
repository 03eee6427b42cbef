//! The dual-key cipher for garbled-table rows.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::label::{tweak, Label};

/// Key of the process-wide fixed-key AES instance. Public shared
/// randomness; both parties use the same constant.
const FIXED_KEY: [u8; 16] = [
    0x61, 0x98, 0x6c, 0x5f, 0x8e, 0xb0, 0x27, 0x33, 0x54, 0x11, 0xde, 0x90, 0x4b, 0x7c, 0x03,
    0xa9,
];

/// Fixed-key AES-128 encrypting garbled-table rows.
///
/// The row key is derived from both input labels and the gate id,
/// `K = 2A ^ 4B ^ T(id)` with carry-less doubling, and a row ciphertext
/// is `pi(K) ^ K ^ L_out`. The construction is an involution: decryption
/// is encryption with the ciphertext in place of the output label.
#[derive(Clone)]
pub struct GarbleCipher {
    aes: Aes128,
}

impl GarbleCipher {
    pub fn new() -> Self {
        GarbleCipher {
            aes: Aes128::new(GenericArray::from_slice(&FIXED_KEY)),
        }
    }

    fn pi(&self, x: Label) -> Label {
        let mut block = GenericArray::clone_from_slice(&x.to_bytes());
        self.aes.encrypt_block(&mut block);
        let mut bytes = [0u8; Label::BYTES];
        bytes.copy_from_slice(&block);
        Label::from_bytes(bytes)
    }

    fn row_key(a: Label, b: Option<Label>, gate_id: u32) -> Label {
        let mut k = a.double();
        if let Some(b) = b {
            k ^= b.quad();
        }
        k ^ tweak(gate_id)
    }

    /// Encrypt the output label of one table row. `b` is absent for
    /// unary (INV) gates.
    pub fn encrypt(&self, a: Label, b: Option<Label>, gate_id: u32, out: Label) -> Label {
        let k = Self::row_key(a, b, gate_id);
        self.pi(k) ^ k ^ out
    }

    /// Decrypt one table row with the labels held by the evaluator.
    pub fn decrypt(&self, a: Label, b: Option<Label>, gate_id: u32, ciphertext: Label) -> Label {
        self.encrypt(a, b, gate_id, ciphertext)
    }
}

impl Default for GarbleCipher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let mut rng = StdRng::seed_from_u64(3);
        let cipher = GarbleCipher::new();
        for gate_id in 0..32 {
            let a = Label::random(&mut rng);
            let b = Label::random(&mut rng);
            let out = Label::random(&mut rng);
            let ct = cipher.encrypt(a, Some(b), gate_id, out);
            assert_eq!(cipher.decrypt(a, Some(b), gate_id, ct), out);
            let ct = cipher.encrypt(a, None, gate_id, out);
            assert_eq!(cipher.decrypt(a, None, gate_id, ct), out);
        }
    }

    #[test]
    fn wrong_key_does_not_decrypt() {
        let mut rng = StdRng::seed_from_u64(4);
        let cipher = GarbleCipher::new();
        let a = Label::random(&mut rng);
        let b = Label::random(&mut rng);
        let out = Label::random(&mut rng);
        let ct = cipher.encrypt(a, Some(b), 7, out);
        let other = Label::random(&mut rng);
        assert_ne!(cipher.decrypt(other, Some(b), 7, ct), out);
        assert_ne!(cipher.decrypt(a, Some(b), 8, ct), out);
    }
}
