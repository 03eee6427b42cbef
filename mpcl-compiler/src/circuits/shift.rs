//! Shift sub-circuits. Constant counts are pure wire re-routing; a
//! runtime count uses a log-depth barrel of multiplexers.

use super::{Builder, WireId};

/// Left shift by a constant count; vacated positions fill with zero.
pub fn shift_left(b: &mut Builder, x: &[WireId], count: usize) -> Vec<WireId> {
    let zero = b.zero_wire();
    let mut out = vec![zero; x.len()];
    for (i, w) in x.iter().enumerate() {
        if i + count < out.len() {
            out[i + count] = *w;
        }
    }
    out
}

/// Right shift by a constant count. Signed shifts fill with the sign
/// bit, unsigned with zero.
pub fn shift_right(b: &mut Builder, x: &[WireId], count: usize, signed: bool) -> Vec<WireId> {
    let fill = if signed && !x.is_empty() {
        x[x.len() - 1]
    } else {
        b.zero_wire()
    };
    let mut out = vec![fill; x.len()];
    for i in 0..x.len() {
        if i + count < x.len() {
            out[i] = x[i + count];
        }
    }
    out
}

/// Barrel shifter: stage `k` shifts by `2^k` when count bit `k` is
/// set. Counts at or beyond the operand width produce the fill value.
pub fn barrel_shift_left(b: &mut Builder, x: &[WireId], count: &[WireId]) -> Vec<WireId> {
    let mut row = x.to_vec();
    for (k, sel) in count.iter().enumerate() {
        let shifted = match 1usize.checked_shl(k as u32) {
            Some(amount) if amount < row.len() => shift_left(b, &row, amount),
            _ => {
                let zero = b.zero_wire();
                vec![zero; row.len()]
            }
        };
        row = b.mux(*sel, &shifted, &row);
    }
    row
}

pub fn barrel_shift_right(
    b: &mut Builder,
    x: &[WireId],
    count: &[WireId],
    signed: bool,
) -> Vec<WireId> {
    let mut row = x.to_vec();
    for (k, sel) in count.iter().enumerate() {
        let shifted = match 1usize.checked_shl(k as u32) {
            Some(amount) if amount < row.len() => shift_right(b, &row, amount, signed),
            _ => {
                let fill = if signed && !row.is_empty() {
                    row[row.len() - 1]
                } else {
                    b.zero_wire()
                };
                vec![fill; row.len()]
            }
        };
        row = b.mux(*sel, &shifted, &row);
    }
    row
}
