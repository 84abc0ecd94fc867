// Copyright (c) 2026 rezky_nightky

/// Density-ordered glyph ramp: index 0 is the sparsest glyph, the last
/// index the densest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ramp {
    glyphs: Vec<char>,
}

pub const DEFAULT_RAMP: &str = " .:-=+*#%@";

pub const RAMP_PRESETS: &[(&str, &str)] = &[
    ("classic", DEFAULT_RAMP),
    ("blocks", " ░▒▓█"),
    ("dots", " ·∙•●"),
    ("minimal", " .:*#"),
    ("lines", " -=≡#"),
];

impl Default for Ramp {
    fn default() -> Self {
        Self::from_glyphs(DEFAULT_RAMP).expect("default ramp is valid")
    }
}

impl Ramp {
    pub fn from_glyphs(s: &str) -> Result<Self, String> {
        let glyphs: Vec<char> = s.chars().collect();
        if glyphs.len() < 2 {
            return Err("ramp needs at least 2 glyphs (sparse to dense)".to_string());
        }
        Ok(Self { glyphs })
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn index_for(&self, v: f32) -> usize {
        scale_index(v, self.glyphs.len())
    }

    pub fn glyph_for(&self, v: f32) -> char {
        self.glyphs[self.index_for(v)]
    }
}

/// Maps a normalized intensity to `floor(v * (len - 1))`, clamped into
/// `0..len`. Valid for every `v`, including NaN and out-of-range input.
pub fn scale_index(v: f32, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let last = (len - 1) as f32;
    let idx = (v.clamp(0.0, 1.0) * last).floor();
    if idx.is_nan() {
        return 0;
    }
    (idx as usize).min(len - 1)
}

/// Resolves a preset name, falling back to treating the argument as a
/// literal glyph string.
pub fn ramp_from_str(s: &str) -> Result<Ramp, String> {
    let name = s.trim().to_ascii_lowercase();
    for (preset, glyphs) in RAMP_PRESETS {
        if name == *preset {
            return Ramp::from_glyphs(glyphs);
        }
    }
    Ramp::from_glyphs(s)
}

pub fn print_list_ramps() {
    println!("RAMPS:");
    for (name, glyphs) in RAMP_PRESETS {
        println!("  {:<10} \"{}\"", name, glyphs);
    }
    println!("  (any other string of 2+ glyphs is used literally, sparse first)");
}
