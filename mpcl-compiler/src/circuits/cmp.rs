//! Comparator sub-circuits.

use mpcl_circuit::Op;

use super::{Builder, WireId};

/// Half comparator for the lowest bit: `bout = ^a & b`.
fn half_lt(b: &mut Builder, x: WireId, y: WireId) -> WireId {
    let nx = b.inv(x);
    b.gate(Op::And, nx, y)
}

/// Full comparator with borrow-in.
fn full_lt(b: &mut Builder, x: WireId, y: WireId, bin: WireId) -> WireId {
    let w3 = b.gate(Op::Xor, x, y);
    let w4 = b.inv(x);
    let w5 = b.gate(Op::And, y, w4);
    let w6 = b.inv(w3);
    let w7 = b.gate(Op::And, bin, w6);
    b.gate(Op::Or, w5, w7)
}

/// Map operands for signed comparison: flipping the sign bit turns a
/// two's-complement order into an unsigned one.
fn sign_adjust(b: &mut Builder, x: &[WireId], signed: bool) -> Vec<WireId> {
    if !signed || x.is_empty() {
        return x.to_vec();
    }
    let mut out = x.to_vec();
    let last = out.len() - 1;
    out[last] = b.inv(out[last]);
    out
}

/// `x < y` via a borrow chain from the low bits up.
pub fn less(b: &mut Builder, x: &[WireId], y: &[WireId], signed: bool) -> WireId {
    let (x, y) = b.zero_pad(x, y);
    let x = sign_adjust(b, &x, signed);
    let y = sign_adjust(b, &y, signed);
    let mut borrow = half_lt(b, x[0], y[0]);
    for (x, y) in x.iter().zip(y.iter()).skip(1) {
        borrow = full_lt(b, *x, *y, borrow);
    }
    borrow
}

/// `x <= y`, computed as `^(y < x)`.
pub fn less_or_equal(b: &mut Builder, x: &[WireId], y: &[WireId], signed: bool) -> WireId {
    let w = less(b, y, x, signed);
    b.inv(w)
}

pub fn greater(b: &mut Builder, x: &[WireId], y: &[WireId], signed: bool) -> WireId {
    less(b, y, x, signed)
}

pub fn greater_or_equal(b: &mut Builder, x: &[WireId], y: &[WireId], signed: bool) -> WireId {
    let w = less(b, x, y, signed);
    b.inv(w)
}

/// `x == y`: no bit differs, `^OR` over the bitwise XORs.
pub fn equal(b: &mut Builder, x: &[WireId], y: &[WireId]) -> WireId {
    let w = not_equal(b, x, y);
    b.inv(w)
}

/// `x != y`: OR over the bitwise XORs.
pub fn not_equal(b: &mut Builder, x: &[WireId], y: &[WireId]) -> WireId {
    let (x, y) = b.zero_pad(x, y);
    let diffs: Vec<WireId> = x
        .iter()
        .zip(y.iter())
        .map(|(x, y)| b.gate(Op::Xor, *x, *y))
        .collect();
    b.or_reduce(&diffs)
}
