//! Integer arithmetic sub-circuits over little-endian wire vectors.

use mpcl_circuit::Op;

use super::{Builder, WireId};

/// Half adder: `s = a ^ b`, `c = a & b`.
pub fn half_adder(b: &mut Builder, x: WireId, y: WireId) -> (WireId, WireId) {
    let s = b.gate(Op::Xor, x, y);
    let c = b.gate(Op::And, x, y);
    (s, c)
}

/// Full adder with one AND gate: `s = a ^ b ^ cin`,
/// `cout = ((a ^ cin) & (b ^ cin)) ^ cin`.
pub fn full_adder(b: &mut Builder, x: WireId, y: WireId, cin: WireId) -> (WireId, WireId) {
    let t1 = b.gate(Op::Xor, x, cin);
    let t2 = b.gate(Op::Xor, y, cin);
    let s = b.gate(Op::Xor, x, t2);
    let t3 = b.gate(Op::And, t1, t2);
    let cout = b.gate(Op::Xor, t3, cin);
    (s, cout)
}

/// Ripple-carry adder; the result has the width of the wider operand
/// and the final carry is discarded.
pub fn adder(b: &mut Builder, x: &[WireId], y: &[WireId]) -> Vec<WireId> {
    let (x, y) = b.zero_pad(x, y);
    let mut result = Vec::with_capacity(x.len());
    let mut carry = None;
    for (x, y) in x.iter().zip(y.iter()) {
        let (s, c) = match carry {
            None => half_adder(b, *x, *y),
            Some(cin) => full_adder(b, *x, *y, cin),
        };
        result.push(s);
        carry = Some(c);
    }
    result
}

/// Two's-complement subtractor: add `^y` with carry-in 1.
pub fn subtractor(b: &mut Builder, x: &[WireId], y: &[WireId]) -> Vec<WireId> {
    let (x, y) = b.zero_pad(x, y);
    let mut result = Vec::with_capacity(x.len());
    let mut carry = b.one_wire();
    for (x, y) in x.iter().zip(y.iter()) {
        let ny = b.inv(*y);
        let (s, c) = full_adder(b, *x, ny, carry);
        result.push(s);
        carry = c;
    }
    result
}

/// Array multiplier: AND partial products accumulated with ripple
/// adders, truncated to the operand width.
pub fn multiplier(b: &mut Builder, x: &[WireId], y: &[WireId]) -> Vec<WireId> {
    let (x, y) = b.zero_pad(x, y);
    let width = x.len();
    let mut acc: Vec<WireId> = x.iter().map(|xb| b.gate(Op::And, *xb, y[0])).collect();
    for (j, yb) in y.iter().enumerate().skip(1) {
        if j >= width {
            break;
        }
        // Row j contributes x * y[j] << j; only width - j product bits
        // land inside the result.
        let row: Vec<WireId> = x[..width - j]
            .iter()
            .map(|xb| b.gate(Op::And, *xb, *yb))
            .collect();
        let upper = adder(b, &acc[j..], &row);
        acc.truncate(j);
        acc.extend(upper);
    }
    acc
}

/// Restoring long division producing quotient and remainder. Division
/// by a runtime zero is not trapped; the circuit yields the restoring
/// chain's natural result.
pub fn divider(b: &mut Builder, x: &[WireId], y: &[WireId]) -> (Vec<WireId>, Vec<WireId>) {
    let (x, y) = b.zero_pad(x, y);
    let n = y.len();
    let y_inv: Vec<WireId> = y.iter().map(|w| b.inv(*w)).collect();

    let zero = b.zero_wire();
    let one = b.one_wire();
    let mut r_out = vec![zero; n + 1];
    let mut quotient = vec![zero; x.len()];

    for i in 0..x.len() {
        // Shift the next dividend bit into the remainder.
        let mut r_in = Vec::with_capacity(n + 1);
        r_in.push(x[x.len() - 1 - i]);
        r_in.extend_from_slice(&r_out[..n]);

        // r - y via addition of ^y + 1 over n+1 bits.
        let mut carry = one;
        let mut diff = Vec::with_capacity(n + 1);
        for j in 0..=n {
            let yw = if j < n { y_inv[j] } else { one };
            let (s, c) = full_adder(b, r_in[j], yw, carry);
            diff.push(s);
            carry = c;
        }

        // No borrow means the subtraction fits: quotient bit set, keep
        // the difference; otherwise restore the previous remainder.
        quotient[x.len() - 1 - i] = carry;
        for j in 0..=n {
            r_out[j] = b.mux_bit(carry, diff[j], r_in[j]);
        }
    }

    (quotient, r_out[..n].to_vec())
}
