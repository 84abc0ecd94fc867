// Copyright (c) 2026 rezky_nightky

use std::io::{stdout, Result, Stdout, Write};

use crossterm::{
    cursor, event,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal, ExecutableCommand, QueueableCommand,
};

use crate::cell::Cell;
use crate::frame::Frame;

/// What the terminal currently shows, cell for cell.
struct Shadow {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
}

impl Shadow {
    fn new(width: u16, height: u16) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            cells: vec![Cell::blank_with_bg(None); len],
        }
    }
}

/// Cursor and color state already sent to the terminal, so redundant
/// escape sequences are skipped.
struct Pen {
    fg: Option<Color>,
    bg: Option<Color>,
    pos: Option<(u16, u16)>,
}

impl Pen {
    fn new() -> Self {
        Self {
            fg: None,
            bg: None,
            pos: None,
        }
    }

    fn colors(&mut self, out: &mut Stdout, fg: Option<Color>, bg: Option<Color>) -> Result<()> {
        if fg != self.fg {
            out.queue(SetForegroundColor(fg.unwrap_or(Color::Reset)))?;
            self.fg = fg;
        }
        if bg != self.bg {
            out.queue(SetBackgroundColor(bg.unwrap_or(Color::Reset)))?;
            self.bg = bg;
        }
        Ok(())
    }

    fn move_to(&mut self, out: &mut Stdout, x: u16, y: u16) -> Result<()> {
        if self.pos != Some((x, y)) {
            out.queue(cursor::MoveTo(x, y))?;
        }
        Ok(())
    }
}

pub struct Terminal {
    stdout: Stdout,
    mouse: bool,
    shadow: Option<Shadow>,
    text: String,
    order: Vec<usize>,
}

impl Terminal {
    pub fn new(mouse: bool) -> Result<Self> {
        let mut out = stdout();
        terminal::enable_raw_mode()?;
        let init_res: Result<()> = (|| {
            out.execute(terminal::EnterAlternateScreen)?;
            out.execute(cursor::Hide)?;
            let _ = out.execute(terminal::DisableLineWrap);
            out.execute(ResetColor)?;
            out.execute(terminal::Clear(terminal::ClearType::All))?;
            // Capability probes, not preconditions: a terminal without
            // mouse or focus reporting still animates.
            if mouse {
                let _ = out.execute(event::EnableMouseCapture);
            }
            let _ = out.execute(event::EnableFocusChange);
            out.flush()?;
            Ok(())
        })();
        if let Err(e) = init_res {
            restore_terminal_best_effort();
            return Err(e);
        }
        Ok(Self {
            stdout: out,
            mouse,
            shadow: None,
            text: String::with_capacity(64),
            order: Vec::new(),
        })
    }

    pub fn size(&self) -> Result<(u16, u16)> {
        terminal::size()
    }

    pub fn poll_event(timeout: std::time::Duration) -> Result<bool> {
        event::poll(timeout)
    }

    pub fn read_event() -> Result<event::Event> {
        event::read()
    }

    pub fn draw(&mut self, frame: &mut Frame) -> Result<()> {
        let resized = self
            .shadow
            .as_ref()
            .map(|s| (s.width, s.height) != (frame.width, frame.height))
            .unwrap_or(true);
        if resized {
            self.shadow = Some(Shadow::new(frame.width, frame.height));
            self.stdout
                .queue(terminal::Clear(terminal::ClearType::All))?;
        }

        // Diffing beats a full repaint only while the dirty set is small.
        let total = frame.width as usize * frame.height as usize;
        let full =
            resized || frame.is_dirty_all() || frame.dirty_indices().len() * 3 >= total.max(1);
        if full {
            self.draw_full(frame)?;
        } else {
            self.draw_dirty(frame)?;
        }

        self.stdout.queue(ResetColor)?;
        self.stdout.flush()?;
        frame.clear_dirty();
        Ok(())
    }

    fn draw_full(&mut self, frame: &Frame) -> Result<()> {
        let shadow = self.shadow.as_mut().expect("allocated in draw");
        let mut pen = Pen::new();
        for y in 0..frame.height {
            self.stdout.queue(cursor::MoveTo(0, y))?;
            for x in 0..frame.width {
                let i = y as usize * frame.width as usize + x as usize;
                let cell = frame.cell_at_index(i);
                pen.colors(&mut self.stdout, cell.fg, cell.bg)?;
                self.stdout.queue(Print(cell.ch))?;
                shadow.cells[i] = cell;
            }
        }
        Ok(())
    }

    /// Emits sorted dirty cells as runs: adjacent cells in one row that
    /// share fg/bg go out as a single `Print`, one color change each.
    fn draw_dirty(&mut self, frame: &Frame) -> Result<()> {
        let shadow = self.shadow.as_mut().expect("allocated in draw");
        let width = (frame.width as usize).max(1);

        self.order.clear();
        self.order.extend_from_slice(frame.dirty_indices());
        self.order.sort_unstable();

        let mut pen = Pen::new();
        let mut i = 0usize;
        while i < self.order.len() {
            let first = self.order[i];
            let head = frame.cell_at_index(first);
            if shadow.cells.get(first).copied() == Some(head) {
                i += 1;
                continue;
            }

            let row = first / width;
            self.text.clear();
            self.text.push(head.ch);
            shadow.cells[first] = head;

            let mut last = first;
            let mut j = i + 1;
            while j < self.order.len() {
                let next = self.order[j];
                if next != last + 1 || next / width != row {
                    break;
                }
                let cell = frame.cell_at_index(next);
                if cell.fg != head.fg || cell.bg != head.bg {
                    break;
                }
                if shadow.cells.get(next).copied() == Some(cell) {
                    break;
                }
                self.text.push(cell.ch);
                shadow.cells[next] = cell;
                last = next;
                j += 1;
            }

            let x = (first % width) as u16;
            let y = row as u16;
            pen.move_to(&mut self.stdout, x, y)?;
            pen.colors(&mut self.stdout, head.fg, head.bg)?;
            self.stdout.queue(Print(self.text.as_str()))?;

            let run_len = (last - first + 1) as u16;
            let next_x = x.saturating_add(run_len);
            pen.pos = if next_x < frame.width {
                Some((next_x, y))
            } else {
                None
            };

            i = j;
        }
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.mouse {
            let _ = self.stdout.execute(event::DisableMouseCapture);
        }
        let _ = self.stdout.execute(event::DisableFocusChange);
        let _ = self.stdout.execute(ResetColor);
        let _ = self.stdout.execute(cursor::Show);
        let _ = self.stdout.execute(terminal::EnableLineWrap);
        let _ = self.stdout.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
        let _ = self.stdout.flush();
    }
}

pub fn restore_terminal_best_effort() {
    let mut out = stdout();
    let _ = out.execute(event::DisableMouseCapture);
    let _ = out.execute(event::DisableFocusChange);
    let _ = out.execute(ResetColor);
    let _ = out.execute(cursor::Show);
    let _ = out.execute(terminal::EnableLineWrap);
    let _ = out.execute(terminal::LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();
    let _ = out.flush();
}
