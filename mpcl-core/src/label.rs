//! 128-bit wire labels and garbling tweaks.
//!
//! A label stands for the logical 0 or 1 of a single circuit wire inside
//! the garbled protocol. The least significant bit is the
//! permute-and-point bit ("S bit") used to index garbled-table rows.

use rand::{CryptoRng, RngCore};
use std::fmt;
use std::ops::{BitXor, BitXorAssign};

/// A 128-bit wire label.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Label(u128);

impl Label {
    /// The all-zero label.
    pub const ZERO: Self = Label(0);
    /// Number of bytes in a serialized label.
    pub const BYTES: usize = 16;

    /// Sample a uniformly random label.
    pub fn random<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_bytes(&mut bytes);
        Label(u128::from_le_bytes(bytes))
    }

    /// Sample the global Free-XOR offset `R`: uniform, with the permute
    /// bit forced to 1 so that `S(L1) != S(L0)` on every wire.
    pub fn random_delta<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        let mut delta = Self::random(rng);
        delta.set_s(true);
        delta
    }

    /// The permute-and-point bit.
    #[inline]
    pub fn s(&self) -> bool {
        self.0 & 1 == 1
    }

    /// Set the permute-and-point bit.
    #[inline]
    pub fn set_s(&mut self, bit: bool) {
        self.0 = (self.0 & !1) | bit as u128;
    }

    /// Carry-less doubling, used in the dual-key derivation.
    #[inline]
    pub fn double(&self) -> Self {
        Label(self.0 << 1)
    }

    /// Carry-less quadrupling, used in the dual-key derivation.
    #[inline]
    pub fn quad(&self) -> Self {
        Label(self.0 << 2)
    }

    /// Little-endian byte serialization.
    #[inline]
    pub fn to_bytes(self) -> [u8; Self::BYTES] {
        self.0.to_le_bytes()
    }

    /// Deserialize from little-endian bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; Self::BYTES]) -> Self {
        Label(u128::from_le_bytes(bytes))
    }
}

/// The tweak mixed into the key derivation of gate `gate_id`.
#[inline]
pub fn tweak(gate_id: u32) -> Label {
    Label(gate_id as u128)
}

impl BitXor for Label {
    type Output = Label;

    #[inline]
    fn bitxor(self, rhs: Label) -> Label {
        Label(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for Label {
    #[inline]
    fn bitxor_assign(&mut self, rhs: Label) {
        self.0 ^= rhs.0;
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Label({:032x})", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn delta_has_permute_bit_set() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert!(Label::random_delta(&mut rng).s());
        }
    }

    #[test]
    fn label_pair_differs_by_delta() {
        let mut rng = StdRng::seed_from_u64(1);
        let delta = Label::random_delta(&mut rng);
        let zero = Label::random(&mut rng);
        let one = zero ^ delta;
        assert_eq!(one ^ zero, delta);
        assert_ne!(zero.s(), one.s());
    }

    #[test]
    fn bytes_round_trip() {
        let mut rng = StdRng::seed_from_u64(2);
        let label = Label::random(&mut rng);
        assert_eq!(Label::from_bytes(label.to_bytes()), label);
    }

    #[test]
    fn double_and_quad_shift() {
        let label = Label::from_bytes(1u128.to_le_bytes());
        assert_eq!(label.double(), Label::from_bytes(2u128.to_le_bytes()));
        assert_eq!(label.quad(), Label::from_bytes(4u128.to_le_bytes()));
    }
}
