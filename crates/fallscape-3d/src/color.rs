//! Hex colors from configuration to linear RGB.

fn srgb_channel_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// `0xRRGGBB` in sRGB to linear RGB.
pub fn hex_to_linear(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| srgb_channel_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    [channel(16), channel(8), channel(0)]
}

/// `0xRRGGBB` in sRGB to opaque linear RGBA.
pub fn hex_to_linear_rgba(hex: u32) -> [f32; 4] {
    let [r, g, b] = hex_to_linear(hex);
    [r, g, b, 1.0]
}
