// Copyright (c) 2026 rezky_nightky

use std::time::{Duration, Instant};

use crate::{
    cell::Cell,
    frame::Frame,
    palette::Palette,
    ramp::{scale_index, Ramp},
};

/// One terminal column maps to 10 units and one row to 16 units, the
/// glyph pitch the wave constants were tuned against.
pub const UNIT_PER_COL: f32 = 10.0;
pub const UNIT_PER_ROW: f32 = 16.0;

pub const DEFAULT_MAX_CELLS: usize = 6000;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 33;

const FADE_RADIUS: f32 = 900.0;
const POINTER_FALLOFF: f32 = 150.0;
const POINTER_GAIN: f32 = 2.0;

#[derive(Clone, Copy, Debug)]
pub struct FieldCell {
    pub col: u16,
    pub row: u16,
    x: f32,
    y: f32,
    phase: [f32; 3],
    fade: f32,
}

/// Procedural wave field.
///
/// Cells are precomputed on every rebuild; a tick only reads them to
/// derive a transient intensity per cell. Pointer position and the
/// visibility flag are written by the event loop and read here, nothing
/// else touches them.
pub struct WaveField {
    pub cols: u16,
    pub rows: u16,

    col_stride: u16,
    row_stride: u16,
    max_cells: usize,

    cells: Vec<FieldCell>,

    pub palette: Palette,
    ramp: Ramp,

    pointer: Option<(f32, f32)>,
    pointer_enabled: bool,
    visible: bool,
    reduced_motion: bool,
    cleared_once: bool,
    pub paused: bool,

    start: Instant,
    last_frame: Option<Instant>,
    frame_interval: Duration,
}

impl WaveField {
    pub fn new(palette: Palette, ramp: Ramp, col_stride: u16, row_stride: u16) -> Self {
        Self {
            cols: 0,
            rows: 0,
            col_stride: col_stride.max(1),
            row_stride: row_stride.max(1),
            max_cells: DEFAULT_MAX_CELLS,
            cells: Vec::new(),
            palette,
            ramp,
            pointer: None,
            pointer_enabled: true,
            visible: true,
            reduced_motion: false,
            cleared_once: false,
            paused: false,
            start: Instant::now(),
            last_frame: None,
            frame_interval: Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS),
        }
    }

    pub fn set_max_cells(&mut self, max: usize) {
        self.max_cells = max.max(1);
    }

    pub fn set_frame_interval(&mut self, d: Duration) {
        self.frame_interval = d;
    }

    pub fn set_pointer_enabled(&mut self, on: bool) {
        self.pointer_enabled = on;
        if !on {
            self.pointer = None;
        }
    }

    pub fn set_reduced_motion(&mut self, on: bool) {
        self.reduced_motion = on;
        self.cleared_once = false;
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Records the latest pointer position in terminal coordinates.
    pub fn set_pointer(&mut self, col: u16, row: u16) {
        if self.pointer_enabled {
            self.pointer = Some((col as f32 * UNIT_PER_COL, row as f32 * UNIT_PER_ROW));
        }
    }

    pub fn clear_pointer(&mut self) {
        self.pointer = None;
    }

    pub fn cells(&self) -> &[FieldCell] {
        &self.cells
    }

    /// Effective strides after the max-cells policy: both configured
    /// strides are scaled by the smallest integer factor that brings the
    /// projected cell count under the ceiling.
    fn effective_strides(&self, cols: u16, rows: u16) -> (usize, usize) {
        let base_c = self.col_stride as usize;
        let base_r = self.row_stride as usize;
        let cols = cols as usize;
        let rows = rows as usize;

        let mut k = 1usize;
        loop {
            let cs = base_c * k;
            let rs = base_r * k;
            let ncols = cols.div_ceil(cs);
            let nrows = rows.div_ceil(rs);
            if ncols * nrows <= self.max_cells {
                return (cs, rs);
            }
            k += 1;
        }
    }

    /// Rebuilds the cell grid for a new terminal size. Cells are
    /// immutable until the next rebuild.
    pub fn rebuild(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        self.cells.clear();
        if cols == 0 || rows == 0 {
            return;
        }

        let (cs, rs) = self.effective_strides(cols, rows);
        let center_x = (cols.saturating_sub(1) as f32 / 2.0) * UNIT_PER_COL;
        let center_y = (rows.saturating_sub(1) as f32 / 2.0) * UNIT_PER_ROW;

        let mut row = 0usize;
        while row < rows as usize {
            let mut col = 0usize;
            while col < cols as usize {
                let x = col as f32 * UNIT_PER_COL;
                let y = row as f32 * UNIT_PER_ROW;
                let dx = x - center_x;
                let dy = y - center_y;
                let dist = (dx * dx + dy * dy).sqrt();
                self.cells.push(FieldCell {
                    col: col as u16,
                    row: row as u16,
                    x,
                    y,
                    phase: [x * 0.005, y * 0.008, (x + y) * 0.003],
                    fade: 1.0 - (dist / FADE_RADIUS).clamp(0.0, 1.0),
                });
                col += cs;
            }
            row += rs;
        }

        self.last_frame = None;
        self.cleared_once = false;
    }

    /// Per-cell intensity in [0, 1] at time `t_ms` since start.
    pub fn intensity_at(&self, cell: &FieldCell, t_ms: f32) -> f32 {
        let w1 = (cell.phase[0] + t_ms * 0.001).sin();
        let w2 = (cell.phase[1] + t_ms * 0.0008).cos();
        let w3 = (cell.phase[2] + t_ms * 0.0012).sin();
        let mut raw = (w1 + w2 + w3) / 3.0;

        if let Some((px, py)) = self.pointer {
            let dx = cell.x - px;
            let dy = cell.y - py;
            let dist = (dx * dx + dy * dy).sqrt();
            let amp = (-dist / POINTER_FALLOFF).exp() * POINTER_GAIN;
            raw += (dist * 0.05 - t_ms * 0.002).sin() * amp;
        }

        let v = ((raw + 1.0) / 2.0).clamp(0.0, 1.0);
        v * cell.fade
    }

    fn elapsed_ms(&self, now: Instant) -> f32 {
        now.saturating_duration_since(self.start).as_secs_f32() * 1000.0
    }

    /// Draws one frame into `frame` if this tick is due. Returns whether
    /// anything was drawn.
    pub fn tick(&mut self, frame: &mut Frame, now: Instant) -> bool {
        if self.reduced_motion {
            if !self.cleared_once {
                frame.clear_with_bg(self.palette.bg);
                self.cleared_once = true;
                return true;
            }
            return false;
        }

        if self.paused || !self.visible {
            return false;
        }

        let first_draw = self.last_frame.is_none();
        if let Some(last) = self.last_frame {
            if now.saturating_duration_since(last) < self.frame_interval {
                return false;
            }
        }
        self.last_frame = Some(now);

        let t = self.elapsed_ms(now);
        let bg = self.palette.bg;
        // Only the first frame after a rebuild repaints everything.
        // Every sampled cell is rewritten below, so later frames mark
        // just the cells whose glyph or color moved and the terminal
        // can flush them as a diff.
        if first_draw {
            frame.clear_with_bg(bg);
        }

        let n_colors = self.palette.colors.len();
        for i in 0..self.cells.len() {
            let cell = self.cells[i];
            let v = self.intensity_at(&cell, t);
            let ch = self.ramp.glyph_for(v);
            let fg = self.palette.colors.get(scale_index(v, n_colors)).copied();
            frame.set(cell.col, cell.row, Cell { ch, fg, bg });
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::palette::custom_palette;
    use crate::ramp::Ramp;
    use crate::runtime::ColorMode;

    fn grey_palette(n: usize) -> Palette {
        let specs: Vec<String> = (0..n)
            .map(|i| {
                let v = (i * 255 / (n - 1).max(1)) as u8;
                format!("#{:02x}{:02x}{:02x}", v, v, v)
            })
            .collect();
        custom_palette(&specs, ColorMode::TrueColor, None).unwrap()
    }

    fn make_field() -> WaveField {
        WaveField::new(grey_palette(5), Ramp::default(), 1, 1)
    }

    #[test]
    fn rebuild_respects_max_cells_ceiling() {
        let mut field = make_field();
        // A 4000x3000 px viewport at the original 10x16 pitch.
        field.rebuild(400, 187);
        assert!(!field.cells().is_empty());
        assert!(field.cells().len() <= DEFAULT_MAX_CELLS);
    }

    #[test]
    fn small_grids_keep_unit_stride() {
        let mut field = make_field();
        field.rebuild(80, 24);
        assert_eq!(field.cells().len(), 80 * 24);
    }

    #[test]
    fn intensity_stays_normalized() {
        let mut field = make_field();
        field.rebuild(60, 20);
        field.set_pointer(30, 10);
        for t in [0.0f32, 333.0, 1234.5, 60_000.0] {
            for cell in field.cells() {
                let v = field.intensity_at(cell, t);
                assert!((0.0..=1.0).contains(&v), "v={} out of range", v);
            }
        }
    }

    #[test]
    fn indices_valid_for_all_intensities() {
        let field = make_field();
        let ramp = Ramp::default();
        for i in 0..=100 {
            let v = i as f32 / 100.0;
            assert!(ramp.index_for(v) < ramp.len());
            assert!(scale_index(v, field.palette.colors.len()) < field.palette.colors.len());
        }
        assert_eq!(scale_index(0.0, 5), 0);
        assert_eq!(scale_index(1.0, 5), 4);
        assert_eq!(ramp.index_for(0.0), 0);
        assert_eq!(ramp.index_for(1.0), ramp.len() - 1);
    }

    #[test]
    fn pointer_ripple_shifts_intensity() {
        let mut field = make_field();
        field.rebuild(40, 12);
        let center = field.cells()[field.cells().len() / 2];
        // sin(t * 0.002) is ~1 here, so the ripple term is ~2 at the
        // pointer itself.
        let t = 785.4;
        let flat = field.intensity_at(&center, t);
        field.set_pointer(center.col, center.row);
        let rippled = field.intensity_at(&center, t);
        assert!((flat - rippled).abs() > 0.1);
    }

    #[test]
    fn tick_honors_frame_interval() {
        let mut field = make_field();
        field.rebuild(20, 10);
        let mut frame = Frame::new(20, 10, None);
        let t0 = Instant::now();
        assert!(field.tick(&mut frame, t0));
        assert!(!field.tick(&mut frame, t0 + Duration::from_millis(10)));
        assert!(field.tick(&mut frame, t0 + Duration::from_millis(40)));
    }

    #[test]
    fn later_ticks_dirty_only_changed_cells() {
        let mut field = make_field();
        field.rebuild(20, 10);
        let mut frame = Frame::new(20, 10, None);
        let t0 = Instant::now();
        assert!(field.tick(&mut frame, t0));
        assert!(frame.is_dirty_all());
        frame.clear_dirty();
        assert!(field.tick(&mut frame, t0 + Duration::from_millis(40)));
        assert!(!frame.is_dirty_all());
        for &i in frame.dirty_indices() {
            assert!(i < 20 * 10);
        }
    }

    #[test]
    fn hidden_field_skips_drawing() {
        let mut field = make_field();
        field.rebuild(20, 10);
        let mut frame = Frame::new(20, 10, None);
        field.set_visible(false);
        assert!(!field.tick(&mut frame, Instant::now()));
        field.set_visible(true);
        assert!(field.tick(&mut frame, Instant::now()));
    }

    #[test]
    fn reduced_motion_clears_once_then_stops() {
        let mut field = make_field();
        field.rebuild(20, 10);
        field.set_reduced_motion(true);
        let mut frame = Frame::new(20, 10, None);
        let t0 = Instant::now();
        assert!(field.tick(&mut frame, t0));
        assert!(!field.tick(&mut frame, t0 + Duration::from_secs(1)));
        assert!(!field.tick(&mut frame, t0 + Duration::from_secs(2)));
    }

    #[test]
    fn disabled_pointer_ignores_motion() {
        let mut field = make_field();
        field.rebuild(20, 10);
        field.set_pointer_enabled(false);
        field.set_pointer(5, 5);
        let cell = field.cells()[0];
        let a = field.intensity_at(&cell, 100.0);
        field.set_pointer(15, 9);
        let b = field.intensity_at(&cell, 100.0);
        assert_eq!(a, b);
    }
}
