use crate::Pixel;

#[inline]
pub(crate) const fn hash(pixel: Pixel) -> u8 {
    // 64 divides 256, so wrapping u8 arithmetic yields the same slot as the full sum.
    let Pixel { r, g, b, a } = pixel;
    r.wrapping_mul(3)
        .wrapping_add(g.wrapping_mul(5))
        .wrapping_add(b.wrapping_mul(7))
        .wrapping_add(a.wrapping_mul(11))
        & 0b111111 // % 64
}

/// Computes the signed difference between two channel values, wrapping around at 256.
#[inline]
pub const fn diff(a: u8, b: u8) -> i8 {
    a.wrapping_sub(b) as i8
}

/// Applies a signed difference to a channel value, wrapping around at 256.
#[inline]
pub const fn sum(a: u8, d: i8) -> u8 {
    a.wrapping_add(d as u8)
}

/// Applies per-channel differences to the color channels of a pixel, keeping its alpha.
#[inline]
pub const fn apply_diff(prev: Pixel, r_diff: i8, g_diff: i8, b_diff: i8) -> Pixel {
    Pixel::new(
        sum(prev.r, r_diff),
        sum(prev.g, g_diff),
        sum(prev.b, b_diff),
        prev.a,
    )
}
