/// Series colors, in the order the charting frontend uses them.
pub const PALETTE: [&str; 20] = [
    "#3366cc", "#dc3912", "#ff9900", "#109618", "#990099", "#0099c6", "#dd4477", "#66aa00",
    "#b82e2e", "#316395", "#994499", "#22aa99", "#aaaa11", "#6633cc", "#e67300", "#8b0707",
    "#651067", "#329262", "#5574a6", "#3b3eac",
];

/// Stable color for an identifier (usually an executable basename).
///
/// Polynomial rolling hash (`h * 31 + c`, wrapping in 32 bits) over the UTF-16
/// code units, reduced modulo the palette size. No seed, so the mapping is the
/// same across runs.
pub fn color_of(id: &str) -> &'static str {
    let hash = id
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    let idx = (hash % PALETTE.len() as i32).unsigned_abs() as usize;
    PALETTE[idx]
}
