//! 8-bit size encoding behind the bin indexing scheme.
//!
//! A size maps onto one of 256 bins laid out like a tiny floating-point
//! format: 5-bit exponent, 3-bit mantissa, hidden high bit for normalized
//! values. Bin minimums grow piecewise-linearly per power of two, so the
//! spread inside any bin is bounded by one mantissa step. That caps per-bin
//! overhead at 1/8 of the region size in every size class.

pub(crate) const MANTISSA_BITS: u32 = 3;
pub(crate) const MANTISSA_VALUE: u32 = 1 << MANTISSA_BITS;
pub(crate) const MANTISSA_MASK: u32 = MANTISSA_VALUE - 1;

/// Smallest bin whose minimum member is >= `size`.
///
/// Used on the allocation path: any node filed under the returned bin is
/// guaranteed to fit the request.
#[inline]
#[must_use]
pub(crate) fn encode_round_up(size: u32) -> u32 {
    if size < MANTISSA_VALUE {
        // Denormal range: sizes 0..7 are their own bins.
        return size;
    }

    let highest_set_bit = 31 - size.leading_zeros();
    let mantissa_start = highest_set_bit - MANTISSA_BITS;
    let exp = mantissa_start + 1;
    let mut mantissa = (size >> mantissa_start) & MANTISSA_MASK;

    // Dropped low bits push the size into the next bin. The add happens on
    // the combined index so a mantissa overflow carries into the exponent.
    if size & ((1 << mantissa_start) - 1) != 0 {
        mantissa += 1;
    }

    (exp << MANTISSA_BITS) + mantissa
}

/// Largest bin whose minimum member is <= `size`.
///
/// Used when filing a free region: later round-up searches that land in
/// this bin can rely on the region being big enough.
#[inline]
#[must_use]
pub(crate) fn encode_round_down(size: u32) -> u32 {
    if size < MANTISSA_VALUE {
        return size;
    }

    let highest_set_bit = 31 - size.leading_zeros();
    let mantissa_start = highest_set_bit - MANTISSA_BITS;
    let exp = mantissa_start + 1;
    let mantissa = (size >> mantissa_start) & MANTISSA_MASK;

    (exp << MANTISSA_BITS) | mantissa
}

/// Smallest size held by `bin`. Inverse of both encoders for every bin
/// whose decoded size fits in 32 bits.
#[inline]
#[must_use]
pub(crate) fn decode(bin: u32) -> u32 {
    let exp = bin >> MANTISSA_BITS;
    let mantissa = bin & MANTISSA_MASK;
    if exp == 0 {
        // Denormal: the mantissa is the size.
        mantissa
    } else {
        (mantissa | MANTISSA_VALUE) << (exp - 1)
    }
}
