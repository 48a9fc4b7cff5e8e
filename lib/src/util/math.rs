/// Linearly remaps `value` from the range `src` to the range `dst`.
///
/// Uses the two-sided lerp so the endpoints of `src` land exactly on the endpoints of `dst`.
#[inline]
pub fn range_convert(value: f32, src: [f32; 2], dst: [f32; 2]) -> f32 {
    let t = (value - src[0]) / (src[1] - src[0]);
    dst[0] * (1.0 - t) + dst[1] * t
}

#[inline]
pub fn fract(value: f32) -> f32 { value - value.floor() }

/// Unpacks four unsigned normalized bytes, lowest byte first.
#[inline]
pub fn unpack_unorm4x8(packed: u32) -> [f32; 4] {
    packed.to_le_bytes().map(|c| c as f32 / 255.0)
}

/// Unpacks four signed normalized bytes, lowest byte first.
#[inline]
pub fn unpack_snorm4x8(packed: u32) -> [f32; 4] {
    packed.to_le_bytes().map(|c| (c as i8 as f32 / 127.0).clamp(-1.0, 1.0))
}
