// Copyright (c) 2026 rezky_nightky

use crossterm::style::Color;

use crate::runtime::{ColorMode, Theme};

/// Intensity-ordered color sequence: index 0 is the dimmest, the last
/// index the brightest. Built once, never mutated afterwards.
#[derive(Clone, Debug)]
pub struct Palette {
    pub colors: Vec<Color>,
    pub bg: Option<Color>,
}

fn from_rgb_list(list: &[(u8, u8, u8)]) -> Vec<Color> {
    list.iter()
        .map(|&(r, g, b)| Color::Rgb { r, g, b })
        .collect()
}

fn dist2(a: (u8, u8, u8), b: (u8, u8, u8)) -> i32 {
    let dr = (a.0 as i32) - (b.0 as i32);
    let dg = (a.1 as i32) - (b.1 as i32);
    let db = (a.2 as i32) - (b.2 as i32);
    dr * dr + dg * dg + db * db
}

/// Nearest entry in the 6x6x6 color cube, as (index, actual rgb).
fn nearest_cube(rgb: (u8, u8, u8)) -> (u8, (u8, u8, u8)) {
    const LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];
    let step = |v: u8| ((v as u16 * 5) + 127) / 255;
    let (r6, g6, b6) = (step(rgb.0), step(rgb.1), step(rgb.2));
    let idx = 16 + (36 * r6 + 6 * g6 + b6) as u8;
    (
        idx,
        (LEVELS[r6 as usize], LEVELS[g6 as usize], LEVELS[b6 as usize]),
    )
}

/// Nearest entry on the 24-step gray ramp, with black and white folded
/// in from the cube corners.
fn nearest_gray(rgb: (u8, u8, u8)) -> (u8, (u8, u8, u8)) {
    let avg = ((rgb.0 as u16 + rgb.1 as u16 + rgb.2 as u16) / 3) as u8;
    if avg < 8 {
        (16, (0, 0, 0))
    } else if avg > 238 {
        (231, (255, 255, 255))
    } else {
        let idx = 232 + (avg - 8) / 10;
        let v = 8 + 10 * (idx - 232);
        (idx, (v, v, v))
    }
}

fn rgb_to_ansi256(r: u8, g: u8, b: u8) -> u8 {
    let rgb = (r, g, b);
    let (cube_idx, cube_rgb) = nearest_cube(rgb);
    let (gray_idx, gray_rgb) = nearest_gray(rgb);
    if dist2(rgb, gray_rgb) < dist2(rgb, cube_rgb) {
        gray_idx
    } else {
        cube_idx
    }
}

const COLOR16_TABLE: [(Color, (u8, u8, u8)); 16] = [
    (Color::Black, (0, 0, 0)),
    (Color::DarkGrey, (128, 128, 128)),
    (Color::Grey, (192, 192, 192)),
    (Color::White, (255, 255, 255)),
    (Color::DarkRed, (128, 0, 0)),
    (Color::Red, (255, 0, 0)),
    (Color::DarkGreen, (0, 128, 0)),
    (Color::Green, (0, 255, 0)),
    (Color::DarkBlue, (0, 0, 128)),
    (Color::Blue, (0, 0, 255)),
    (Color::DarkCyan, (0, 128, 128)),
    (Color::Cyan, (0, 255, 255)),
    (Color::DarkMagenta, (128, 0, 128)),
    (Color::Magenta, (255, 0, 255)),
    (Color::DarkYellow, (128, 128, 0)),
    (Color::Yellow, (255, 255, 0)),
];

fn rgb_to_color16(r: u8, g: u8, b: u8) -> Color {
    COLOR16_TABLE
        .iter()
        .min_by_key(|(_, entry)| dist2((r, g, b), *entry))
        .map(|(c, _)| *c)
        .unwrap_or(Color::White)
}

fn colors_from_rgb(mode: ColorMode, list: &[(u8, u8, u8)]) -> Vec<Color> {
    match mode {
        ColorMode::Mono => vec![Color::White],
        ColorMode::TrueColor => from_rgb_list(list),
        ColorMode::Color256 => list
            .iter()
            .map(|&(r, g, b)| Color::AnsiValue(rgb_to_ansi256(r, g, b)))
            .collect(),
        ColorMode::Color16 => list
            .iter()
            .map(|&(r, g, b)| rgb_to_color16(r, g, b))
            .collect(),
    }
}

fn lerp_rgb(a: (u8, u8, u8), b: (u8, u8, u8), t: f32) -> (u8, u8, u8) {
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round().clamp(0.0, 255.0) as u8;
    (mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

fn gradient_from_stops(stops: &[(u8, u8, u8)], steps: usize) -> Vec<(u8, u8, u8)> {
    if steps == 0 || stops.is_empty() {
        return Vec::new();
    }
    if stops.len() == 1 {
        return vec![stops[0]; steps];
    }
    if steps == 1 {
        return vec![stops[0]];
    }

    let segs = (stops.len() - 1) as f32;
    (0..steps)
        .map(|i| {
            let pos = (i as f32 / (steps - 1) as f32) * segs;
            let seg = (pos.floor() as usize).min(stops.len() - 2);
            lerp_rgb(stops[seg], stops[seg + 1], pos - seg as f32)
        })
        .collect()
}

/// Parses `#rrggbb` or `rrggbb` into an RGB triple.
pub fn parse_hex_color(s: &str) -> Result<(u8, u8, u8), String> {
    let hex = s.trim().strip_prefix('#').unwrap_or_else(|| s.trim());
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("invalid color: {} (expected #rrggbb)", s));
    }
    let r = u8::from_str_radix(&hex[0..2], 16).map_err(|_| format!("invalid color: {}", s))?;
    let g = u8::from_str_radix(&hex[2..4], 16).map_err(|_| format!("invalid color: {}", s))?;
    let b = u8::from_str_radix(&hex[4..6], 16).map_err(|_| format!("invalid color: {}", s))?;
    Ok((r, g, b))
}

fn theme_bg(theme: Theme, mode: ColorMode) -> Color {
    let (r, g, b) = match theme {
        Theme::Dark => (8, 8, 12),
        Theme::Light => (240, 240, 244),
    };
    match mode {
        ColorMode::TrueColor => Color::Rgb { r, g, b },
        ColorMode::Color16 => rgb_to_color16(r, g, b),
        _ => Color::AnsiValue(rgb_to_ansi256(r, g, b)),
    }
}

const PALETTE_STEPS: usize = 9;

const DARK_STOPS: [(u8, u8, u8); 4] = [(16, 18, 28), (52, 66, 110), (110, 150, 205), (220, 236, 255)];
const LIGHT_STOPS: [(u8, u8, u8); 4] = [(225, 228, 238), (150, 162, 195), (72, 88, 135), (18, 24, 44)];

/// Builds the default palette for a theme, quantized to the color mode.
pub fn build_palette(theme: Theme, mode: ColorMode, default_background: bool) -> Palette {
    let stops: &[(u8, u8, u8)] = match theme {
        Theme::Dark => &DARK_STOPS,
        Theme::Light => &LIGHT_STOPS,
    };
    let rgb = gradient_from_stops(stops, PALETTE_STEPS);
    let colors = colors_from_rgb(mode, &rgb);
    let bg = if default_background {
        None
    } else {
        Some(theme_bg(theme, mode))
    };
    Palette { colors, bg }
}

/// Builds a palette from caller-supplied hex colors, preserving order.
pub fn custom_palette(
    specs: &[String],
    mode: ColorMode,
    bg: Option<Color>,
) -> Result<Palette, String> {
    if specs.is_empty() {
        return Err("custom palette needs at least one color".to_string());
    }
    let mut rgb = Vec::with_capacity(specs.len());
    for s in specs {
        rgb.push(parse_hex_color(s)?);
    }
    Ok(Palette {
        colors: colors_from_rgb(mode, &rgb),
        bg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_color_accepts_leading_hash() {
        assert_eq!(parse_hex_color("#ff8000").unwrap(), (255, 128, 0));
        assert_eq!(parse_hex_color("00ff00").unwrap(), (0, 255, 0));
    }

    #[test]
    fn parse_hex_color_rejects_garbage() {
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("zzzzzz").is_err());
    }

    #[test]
    fn custom_palette_preserves_order() {
        let specs = vec!["#000000".to_string(), "#808080".to_string(), "#ffffff".to_string()];
        let p = custom_palette(&specs, ColorMode::TrueColor, None).unwrap();
        assert_eq!(p.colors.len(), 3);
        assert_eq!(p.colors[0], Color::Rgb { r: 0, g: 0, b: 0 });
        assert_eq!(p.colors[2], Color::Rgb { r: 255, g: 255, b: 255 });
    }

    #[test]
    fn mono_collapses_to_single_color() {
        let p = build_palette(Theme::Dark, ColorMode::Mono, true);
        assert_eq!(p.colors, vec![Color::White]);
    }

    #[test]
    fn theme_palette_has_fixed_step_count() {
        for theme in [Theme::Dark, Theme::Light] {
            let p = build_palette(theme, ColorMode::TrueColor, true);
            assert_eq!(p.colors.len(), PALETTE_STEPS);
        }
    }
}
