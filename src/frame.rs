// Copyright (c) 2026 rezky_nightky

use crate::cell::Cell;

/// Cell grid with lazy clearing and dirty tracking.
///
/// Clearing bumps an epoch counter instead of touching every cell; a
/// cell whose write stamp lags the epoch reads as blank. Dirtiness is
/// stamped the same way, so resetting it after a draw is O(dirty).
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u16,
    pub height: u16,
    cells: Vec<Cell>,
    written: Vec<u32>,
    epoch: u32,
    blank: Cell,
    all_dirty: bool,
    dirty_stamp: Vec<u32>,
    dirty_mark: u32,
    dirty: Vec<usize>,
}

impl Frame {
    pub fn new(width: u16, height: u16, bg: Option<crossterm::style::Color>) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            cells: vec![Cell::blank_with_bg(bg); len],
            written: vec![1; len],
            epoch: 1,
            blank: Cell::blank_with_bg(bg),
            all_dirty: true,
            dirty_stamp: vec![0; len],
            dirty_mark: 1,
            dirty: Vec::new(),
        }
    }

    pub fn clear_with_bg(&mut self, bg: Option<crossterm::style::Color>) {
        self.blank = Cell::blank_with_bg(bg);
        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            // u32 wrap, once per ~4 billion clears
            self.written.fill(0);
            self.epoch = 1;
        }
        self.all_dirty = true;
        self.dirty.clear();
    }

    pub fn is_dirty_all(&self) -> bool {
        self.all_dirty
    }

    pub fn dirty_indices(&self) -> &[usize] {
        &self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.all_dirty = false;
        self.dirty.clear();
        self.dirty_mark = self.dirty_mark.wrapping_add(1);
        if self.dirty_mark == 0 {
            self.dirty_stamp.fill(0);
            self.dirty_mark = 1;
        }
    }

    pub fn index(&self, x: u16, y: u16) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    pub fn get(&self, x: u16, y: u16) -> Option<Cell> {
        self.index(x, y).map(|i| self.cell_at_index(i))
    }

    pub fn cell_at_index(&self, i: usize) -> Cell {
        if self.written.get(i).copied() == Some(self.epoch) {
            self.cells[i]
        } else {
            self.blank
        }
    }

    pub fn set(&mut self, x: u16, y: u16, cell: Cell) {
        let Some(i) = self.index(x, y) else {
            return;
        };
        if self.cell_at_index(i) == cell {
            return;
        }

        self.cells[i] = cell;
        self.written[i] = self.epoch;
        if !self.all_dirty && self.dirty_stamp[i] != self.dirty_mark {
            self.dirty_stamp[i] = self.dirty_mark;
            self.dirty.push(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_with_bg_makes_cells_effectively_blank() {
        let mut f = Frame::new(2, 2, None);
        f.set(
            0,
            0,
            Cell {
                ch: 'x',
                fg: None,
                bg: None,
            },
        );
        assert_eq!(f.get(0, 0).unwrap().ch, 'x');
        f.clear_with_bg(None);
        assert_eq!(f.get(0, 0).unwrap().ch, ' ');
    }

    #[test]
    fn set_out_of_bounds_is_ignored() {
        let mut f = Frame::new(2, 2, None);
        f.set(5, 5, Cell::blank_with_bg(None));
        assert!(f.get(5, 5).is_none());
    }

    #[test]
    fn redundant_set_does_not_mark_dirty() {
        let mut f = Frame::new(2, 2, None);
        f.clear_dirty();
        f.set(0, 0, Cell::blank_with_bg(None));
        assert!(f.dirty_indices().is_empty());
    }

    #[test]
    fn set_records_each_cell_once() {
        let mut f = Frame::new(4, 1, None);
        f.clear_dirty();
        let c = Cell {
            ch: '#',
            fg: None,
            bg: None,
        };
        f.set(1, 0, c);
        f.set(1, 0, Cell { ch: '@', ..c });
        assert_eq!(f.dirty_indices(), &[1]);
    }
}
