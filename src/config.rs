// Copyright (c) 2026 rezky_nightky

use std::io::IsTerminal;

use clap::Parser;

use crate::runtime::Theme;

pub const DEFAULT_PARAMS_USAGE: &str = "DEFAULT PARAMS USAGE:\n  wavetrix --theme dark --ramp classic --fps 30 --col-stride 1 --row-stride 1 --max-cells 6000";

pub fn color_enabled_stdout() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if matches!(std::env::var("CLICOLOR").ok().as_deref(), Some("0")) {
        return false;
    }
    std::io::stdout().is_terminal()
}

pub fn parse_theme(s: &str) -> Result<Theme, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "dark" => Ok(Theme::Dark),
        "light" => Ok(Theme::Light),
        _ => Err(format!("invalid theme: {} (see --list-themes)", s)),
    }
}

pub fn print_list_themes() {
    println!("THEMES:");
    println!("  dark   cool blue gradient on a near-black background");
    println!("  light  ink gradient on a paper background");
    println!("  (or pass --colors '#rrggbb,#rrggbb,...' dimmest first)");
}

#[derive(Parser, Debug, Clone)]
#[command(name = "wavetrix", version, disable_version_flag = true)]
pub struct Args {
    #[arg(
        short = 't',
        long = "theme",
        default_value = "dark",
        help_heading = "APPEARANCE",
        help = "Color theme (dark, light; see --list-themes)"
    )]
    pub theme: String,

    #[arg(
        long = "colors",
        help_heading = "APPEARANCE",
        help = "Custom palette as comma-separated #rrggbb colors, dimmest first (overrides --theme)"
    )]
    pub colors: Option<String>,

    #[arg(
        short = 'r',
        long = "ramp",
        default_value = "classic",
        help_heading = "APPEARANCE",
        help = "Glyph ramp, sparse to dense (preset name or literal string; see --list-ramps)"
    )]
    pub ramp: String,

    #[arg(
        long = "transparent",
        help_heading = "APPEARANCE",
        help = "Keep the terminal's own background instead of the theme fill"
    )]
    pub transparent: bool,

    #[arg(
        long = "colormode",
        help_heading = "APPEARANCE",
        help = "Force color mode: 0=mono, 16=16-color, 8=256-color, 24=truecolor (default: auto-detect)"
    )]
    pub colormode: Option<u8>,

    #[arg(
        short = 'f',
        long = "fps",
        default_value_t = 30.0,
        help_heading = "PERFORMANCE",
        help = "Frame-rate ceiling (min 1 max 120)"
    )]
    pub fps: f64,

    #[arg(
        long = "col-stride",
        default_value_t = 1,
        help_heading = "PERFORMANCE",
        help = "Columns between sampled cells (min 1 max 16)"
    )]
    pub col_stride: u16,

    #[arg(
        long = "row-stride",
        default_value_t = 1,
        help_heading = "PERFORMANCE",
        help = "Rows between sampled cells (min 1 max 16)"
    )]
    pub row_stride: u16,

    #[arg(
        long = "max-cells",
        default_value_t = 6000,
        help_heading = "PERFORMANCE",
        help = "Cell-count ceiling; strides scale up to stay under it (min 64 max 65536)"
    )]
    pub max_cells: usize,

    #[arg(
        long = "duration",
        help_heading = "GENERAL",
        help = "Stop after N seconds (min 0.1 max 86400; <=0 disables)"
    )]
    pub duration: Option<f64>,

    #[arg(
        long = "reduced-motion",
        help_heading = "GENERAL",
        help = "Draw nothing after one clear (also honored via WAVETRIX_REDUCED_MOTION)"
    )]
    pub reduced_motion: bool,

    #[arg(
        long = "no-pointer",
        help_heading = "GENERAL",
        help = "Disable the pointer ripple (skips mouse capture)"
    )]
    pub no_pointer: bool,

    #[arg(
        short = 's',
        long = "screensaver",
        help_heading = "GENERAL",
        help = "Exit on any key press"
    )]
    pub screensaver: bool,

    #[arg(
        long = "perf-stats",
        help_heading = "PERFORMANCE",
        help = "Print frame statistics on exit"
    )]
    pub perf_stats: bool,

    #[arg(long = "list-ramps", help_heading = "HELP", help = "List glyph ramp presets")]
    pub list_ramps: bool,

    #[arg(long = "list-themes", help_heading = "HELP", help = "List color themes")]
    pub list_themes: bool,

    #[arg(short = 'v', long = "version", help_heading = "HELP", help = "Print version")]
    pub version: bool,

    #[arg(long = "info", help_heading = "HELP", help = "Print version and build info")]
    pub info: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_theme_accepts_known_names() {
        assert_eq!(parse_theme("dark").unwrap(), Theme::Dark);
        assert_eq!(parse_theme(" Light ").unwrap(), Theme::Light);
        assert!(parse_theme("solarized").is_err());
    }
}
