// Copyright (c) 2026 rezky_nightky

use std::env;
use std::fmt::Display;
use std::time::{Duration, Instant};

#[cfg(unix)]
use std::thread;

use clap::builder::styling::{AnsiColor, Color as ClapColor, Effects, Style as ClapStyle};
use clap::builder::Styles as ClapStyles;
use clap::{CommandFactory, FromArgMatches};
use crossterm::event::{Event, KeyCode, KeyEventKind, MouseEventKind};

#[cfg(unix)]
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook::iterator::Signals;

use wavetrix::config::{
    color_enabled_stdout, parse_theme, print_list_themes, Args, DEFAULT_PARAMS_USAGE,
};
use wavetrix::field::WaveField;
use wavetrix::frame::Frame;
use wavetrix::palette::{build_palette, custom_palette};
use wavetrix::ramp::{print_list_ramps, ramp_from_str};
use wavetrix::runtime::ColorMode;
use wavetrix::terminal::{restore_terminal_best_effort, Terminal};

const HELP_TEMPLATE_PLAIN: &str = "\
{before-help}{about-with-newline}
USAGE:
  {usage}

{all-args}{after-help}";

const HELP_TEMPLATE_COLOR: &str = "\
{before-help}{about-with-newline}
\x1b[1;36mUSAGE:\x1b[0m
  {usage}

{all-args}{after-help}";

fn clap_styles() -> ClapStyles {
    let bold = |c: AnsiColor| {
        ClapStyle::new()
            .effects(Effects::BOLD)
            .fg_color(Some(ClapColor::Ansi(c)))
    };
    let tint = |c: AnsiColor| ClapStyle::new().fg_color(Some(ClapColor::Ansi(c)));
    ClapStyles::styled()
        .header(bold(AnsiColor::Cyan))
        .usage(bold(AnsiColor::Green))
        .literal(tint(AnsiColor::Yellow))
        .placeholder(tint(AnsiColor::Magenta))
}

fn require_range<T: PartialOrd + Display + Copy>(name: &str, v: T, min: T, max: T) -> T {
    if v < min || v > max {
        eprintln!("failed to apply {} {} (min {} max {})", name, v, min, max);
        std::process::exit(1);
    }
    v
}

fn require_finite(name: &str, v: f64) -> f64 {
    if !v.is_finite() {
        eprintln!("failed to apply {} {} (must be a finite number)", name, v);
        std::process::exit(1);
    }
    v
}

fn detect_color_mode_auto() -> ColorMode {
    let colorterm = env::var("COLORTERM")
        .unwrap_or_default()
        .to_ascii_lowercase();
    if colorterm.contains("truecolor") || colorterm.contains("24bit") {
        return ColorMode::TrueColor;
    }

    let term = env::var("TERM").unwrap_or_default().to_ascii_lowercase();
    if term == "dumb" {
        return ColorMode::Mono;
    }

    ColorMode::Color256
}

fn detect_color_mode(args: &Args) -> ColorMode {
    match args.colormode {
        None => detect_color_mode_auto(),
        Some(0) => ColorMode::Mono,
        Some(16) => ColorMode::Color16,
        Some(8) => ColorMode::Color256,
        Some(24) => ColorMode::TrueColor,
        Some(m) => {
            eprintln!("invalid --colormode: {} (allowed: 0,16,8,24)", m);
            std::process::exit(1);
        }
    }
}

fn or_die<T, E: Display>(res: Result<T, E>) -> T {
    match res {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Routes one terminal event into the field. Returns `false` when the
/// event asks the program to stop.
fn apply_event(
    ev: Event,
    screensaver: bool,
    field: &mut WaveField,
    grid: (u16, u16),
    pending_resize: &mut Option<(u16, u16)>,
) -> bool {
    match ev {
        Event::Resize(nw, nh) => *pending_resize = Some((nw, nh)),
        Event::FocusGained => field.set_visible(true),
        Event::FocusLost => {
            field.set_visible(false);
            field.clear_pointer();
        }
        Event::Mouse(m) => {
            if matches!(m.kind, MouseEventKind::Moved | MouseEventKind::Drag(_)) {
                field.set_pointer(m.column, m.row);
            }
        }
        Event::Key(k) if k.kind == KeyEventKind::Press => {
            if screensaver {
                return false;
            }
            match k.code {
                KeyCode::Esc | KeyCode::Char('q') => return false,
                KeyCode::Char('p') => field.toggle_pause(),
                KeyCode::Char(' ') => field.rebuild(grid.0, grid.1),
                _ => {}
            }
        }
        _ => {}
    }
    true
}

fn main() -> std::io::Result<()> {
    std::panic::set_hook(Box::new(|info| {
        restore_terminal_best_effort();
        eprintln!("{}", info);
    }));

    #[cfg(unix)]
    {
        if let Ok(mut signals) = Signals::new([SIGINT, SIGTERM, SIGHUP]) {
            thread::spawn(move || {
                if let Some(sig) = signals.forever().next() {
                    restore_terminal_best_effort();
                    std::process::exit(128 + sig);
                }
            });
        }
    }

    #[cfg(windows)]
    {
        if let Err(e) = ctrlc::set_handler(|| {
            restore_terminal_best_effort();
            std::process::exit(130);
        }) {
            eprintln!("failed to install Ctrl-C handler: {}", e);
        }
    }

    let mut cmd = Args::command();
    cmd = cmd.styles(clap_styles());
    cmd = cmd.before_help(DEFAULT_PARAMS_USAGE);
    cmd = cmd.help_template(if color_enabled_stdout() {
        HELP_TEMPLATE_COLOR
    } else {
        HELP_TEMPLATE_PLAIN
    });
    cmd.build();

    let matches = cmd.get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    if args.list_ramps {
        print_list_ramps();
        return Ok(());
    }

    if args.list_themes {
        print_list_themes();
        return Ok(());
    }

    if args.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.info {
        println!("Version: v{}", env!("CARGO_PKG_VERSION"));
        println!("Build: {}", env!("WAVETRIX_BUILD"));
        let sha = env!("WAVETRIX_GIT_SHA");
        if !sha.is_empty() {
            println!("Commit: {}", sha);
        }
        println!("Copyright: (c) 2026 {}", env!("CARGO_PKG_AUTHORS"));
        println!("License: {}", env!("CARGO_PKG_LICENSE"));
        println!("Source: {}", env!("CARGO_PKG_REPOSITORY"));
        return Ok(());
    }

    let target_fps = require_range("--fps", require_finite("--fps", args.fps), 1.0, 120.0);
    let col_stride = require_range("--col-stride", args.col_stride, 1, 16);
    let row_stride = require_range("--row-stride", args.row_stride, 1, 16);
    let max_cells = require_range("--max-cells", args.max_cells, 64, 65536);
    let duration_s = args.duration.map(|s| {
        let s = require_finite("--duration", s);
        if s > 0.0 {
            require_range("--duration", s, 0.1, 86400.0)
        } else {
            s
        }
    });

    let color_mode = detect_color_mode(&args);

    let palette = if let Some(colors) = &args.colors {
        let specs: Vec<String> = colors
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let mut p = or_die(custom_palette(&specs, color_mode, None));
        if !args.transparent {
            let theme = or_die(parse_theme(&args.theme));
            p.bg = build_palette(theme, color_mode, false).bg;
        }
        p
    } else {
        let theme = or_die(parse_theme(&args.theme));
        build_palette(theme, color_mode, args.transparent)
    };

    let ramp = or_die(ramp_from_str(&args.ramp));

    let reduced_motion = args.reduced_motion || env::var_os("WAVETRIX_REDUCED_MOTION").is_some();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let mut term = Terminal::new(!args.no_pointer)?;
    let (w, h) = term.size()?;

    let mut field = WaveField::new(palette, ramp, col_stride, row_stride);
    field.set_max_cells(max_cells);
    field.set_pointer_enabled(!args.no_pointer);
    field.set_reduced_motion(reduced_motion);
    let target_period = Duration::from_secs_f64(1.0 / target_fps);
    field.set_frame_interval(target_period);
    field.rebuild(w, h);

    let mut frame = Frame::new(w, h, field.palette.bg);

    let start_time = Instant::now();
    let end_time = duration_s
        .filter(|s| *s > 0.0)
        .map(|s| start_time + Duration::from_secs_f64(s));

    let mut next_frame = Instant::now();
    let mut running = true;

    let mut perf_frames: u64 = 0;
    let mut perf_drawn_frames: u64 = 0;

    while running {
        if end_time.is_some_and(|end| Instant::now() >= end) {
            break;
        }
        let mut pending_resize: Option<(u16, u16)> = None;

        loop {
            while Terminal::poll_event(Duration::from_millis(0))? {
                let ev = Terminal::read_event()?;
                let grid = (frame.width, frame.height);
                if !apply_event(ev, args.screensaver, &mut field, grid, &mut pending_resize) {
                    running = false;
                    break;
                }
            }

            if !running || pending_resize.is_some() {
                break;
            }

            let now = Instant::now();
            if now >= next_frame {
                break;
            }

            let mut timeout = next_frame - now;
            if let Some(end) = end_time {
                if now >= end {
                    break;
                }
                timeout = timeout.min(end - now);
            }
            let _ = Terminal::poll_event(timeout)?;
        }

        if !running {
            break;
        }

        if let Some((nw, nh)) = pending_resize {
            field.rebuild(nw, nh);
            frame = Frame::new(nw, nh, field.palette.bg);
        }

        let drew = field.tick(&mut frame, Instant::now());
        if drew && (frame.is_dirty_all() || !frame.dirty_indices().is_empty()) {
            term.draw(&mut frame)?;
        }

        if args.perf_stats {
            perf_frames = perf_frames.saturating_add(1);
            if drew {
                perf_drawn_frames = perf_drawn_frames.saturating_add(1);
            }
        }

        next_frame += target_period;
        let now = Instant::now();
        if now > next_frame {
            next_frame = now;
        }
    }

    if args.perf_stats {
        drop(term);
        let elapsed_s = start_time.elapsed().as_secs_f64().max(0.000_001);
        let drawn_ratio = (perf_drawn_frames as f64) / (perf_frames as f64).max(1.0);

        println!("PERF STATS:");
        println!("  elapsed_s: {:.3}", elapsed_s);
        println!("  target_fps: {:.3}", target_fps);
        println!("  loop_iterations: {}", perf_frames);
        println!(
            "  drawn_frames: {} ({:.1}%)",
            perf_drawn_frames,
            drawn_ratio * 100.0
        );
    }

    Ok(())
}
