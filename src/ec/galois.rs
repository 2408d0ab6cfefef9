//! GF(2^8) Arithmetic
//!
//! Byte arithmetic over the finite field GF(256) generated by the
//! irreducible polynomial x^8 + x^4 + x^3 + x^2 + 1 (0x11D) with
//! generator 2. Addition is XOR; multiplication and division go through
//! log/exp tables built once on first use.

use once_cell::sync::Lazy;

/// Low byte of the field polynomial (x^8 is implicit)
pub const GENERATING_POLYNOMIAL: u8 = 0x1D;

/// Number of non-zero field elements
pub const FIELD_ORDER: usize = 255;

/// Log/exp tables. `exp` is doubled so `exp[log a + log b]` never wraps.
struct Tables {
    log: [u8; 256],
    exp: [u8; FIELD_ORDER * 2],
}

static TABLES: Lazy<Tables> = Lazy::new(|| {
    let mut log = [0u8; 256];
    let mut exp = [0u8; FIELD_ORDER * 2];

    let mut b: u16 = 1;
    for power in 0..FIELD_ORDER {
        exp[power] = b as u8;
        exp[power + FIELD_ORDER] = b as u8;
        log[b as usize] = power as u8;

        b <<= 1;
        if b & 0x100 != 0 {
            b ^= 0x100 | GENERATING_POLYNOMIAL as u16;
        }
    }

    Tables { log, exp }
});

/// GF(2^8) multiplication lookup table, 64KiB
#[allow(clippy::needless_range_loop)]
static MUL_TABLE: Lazy<Vec<[u8; 256]>> = Lazy::new(|| {
    let mut table = vec![[0u8; 256]; 256];
    for a in 0..256 {
        for b in 0..256 {
            table[a][b] = mul_slow(a as u8, b as u8);
        }
    }
    table
});

/// Field addition (and subtraction)
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Field multiplication through the log/exp tables
fn mul_slow(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = &*TABLES;
    t.exp[t.log[a as usize] as usize + t.log[b as usize] as usize]
}

/// Field multiplication
#[inline]
pub fn mul(a: u8, b: u8) -> u8 {
    MUL_TABLE[a as usize][b as usize]
}

/// Field division. Returns `None` when dividing by zero.
pub fn div(a: u8, b: u8) -> Option<u8> {
    if b == 0 {
        return None;
    }
    if a == 0 {
        return Some(0);
    }
    let t = &*TABLES;
    let diff = t.log[a as usize] as usize + FIELD_ORDER - t.log[b as usize] as usize;
    Some(t.exp[diff % FIELD_ORDER])
}

/// Multiplicative inverse. Returns `None` for zero.
pub fn inverse(a: u8) -> Option<u8> {
    div(1, a)
}

/// Raise `a` to the `n`th power. `0^0` is defined as 1.
pub fn exp(a: u8, n: usize) -> u8 {
    if n == 0 {
        return 1;
    }
    if a == 0 {
        return 0;
    }
    let t = &*TABLES;
    let log_result = (t.log[a as usize] as usize * n) % FIELD_ORDER;
    t.exp[log_result]
}

/// `output[i] ^= coefficient * input[i]` for every byte.
///
/// The inner loop of both parity generation and reconstruction.
#[inline]
pub fn mul_slice_xor(coefficient: u8, input: &[u8], output: &mut [u8]) {
    if coefficient == 0 {
        return;
    }
    let row = &MUL_TABLE[coefficient as usize];
    for (out, &byte) in output.iter_mut().zip(input) {
        *out ^= row[byte as usize];
    }
}

// =============================================================================
// Tests
// =============================================================================
