use plotters::style::RGBColor;

/// Anchors of the magma colormap, evenly spaced over [0, 1].
const MAGMA: [(u8, u8, u8); 9] = [
    (0, 0, 4),
    (28, 16, 68),
    (79, 18, 123),
    (129, 37, 129),
    (181, 54, 122),
    (229, 80, 100),
    (251, 135, 97),
    (254, 194, 135),
    (252, 253, 191),
];

/// Magma colour for `t` in [0, 1]; out-of-range values are clamped.
pub fn magma(t: f32) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (MAGMA.len() - 1) as f32;
    let i = (scaled.floor() as usize).min(MAGMA.len() - 2);
    let frac = scaled - i as f32;
    let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * frac).round() as u8;
    let (a, b) = (MAGMA[i], MAGMA[i + 1]);
    RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}
