//! Food set
//!
//! Membership is keyed by cell with O(1) lookup. A cell is in the set iff the
//! presenter currently shows it as food.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

use crate::game::color::Color;
use crate::game::grid::Cell;
use crate::game::presenter::Presenter;

/// All food pellets currently on the grid
#[derive(Debug, Default)]
pub struct FoodField {
    /// OPTIMIZATION: FxHasher - cells are small integer keys
    cells: HashMap<Cell, Color, FxBuildHasher>,
}

impl FoodField {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add food at `cell`. Returns false (no-op) if the cell already has food.
    pub fn spawn(&mut self, cell: Cell, color: Color, presenter: &mut dyn Presenter) -> bool {
        if self.cells.contains_key(&cell) {
            return false;
        }
        self.cells.insert(cell, color);
        presenter.paint_food(cell, color);
        true
    }

    /// Remove food at `cell`. Returns false (no-op) if there was none.
    ///
    /// Idempotent: the server may report a consumption the client already
    /// applied locally.
    pub fn consume(&mut self, cell: Cell, presenter: &mut dyn Presenter) -> bool {
        if self.cells.remove(&cell).is_none() {
            return false;
        }
        presenter.clear_food(cell);
        true
    }

    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains_key(&cell)
    }

    pub fn color_at(&self, cell: Cell) -> Option<Color> {
        self.cells.get(&cell).copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Cell, Color)> + '_ {
        self.cells.iter().map(|(c, col)| (*c, *col))
    }

    /// Paint every pellet (used after a bulk load)
    pub fn paint_all(&self, presenter: &mut dyn Presenter) {
        for (cell, color) in self.iter() {
            presenter.paint_food(cell, color);
        }
    }

    /// Insert without painting; caller paints once the whole world is staged
    pub(crate) fn insert_silent(&mut self, cell: Cell, color: Color) -> bool {
        match self.cells.entry(cell) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(color);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::presenter::{PaintCall, RecordingPresenter};

    fn red() -> Color {
        Color::from_rgb(255, 0, 0)
    }

    #[test]
    fn test_spawn_paints_once() {
        let mut food = FoodField::new();
        let mut p = RecordingPresenter::new();

        assert!(food.spawn(Cell::new(2, 2), red(), &mut p));
        assert!(!food.spawn(Cell::new(2, 2), Color::from_rgb(0, 255, 0), &mut p));

        assert_eq!(food.len(), 1);
        assert_eq!(food.color_at(Cell::new(2, 2)), Some(red()));
        assert_eq!(p.calls, vec![PaintCall::PaintFood(Cell::new(2, 2), red())]);
    }

    #[test]
    fn test_consume_is_idempotent() {
        let mut food = FoodField::new();
        let mut p = RecordingPresenter::new();
        food.spawn(Cell::new(1, 1), red(), &mut p);
        p.clear();

        assert!(food.consume(Cell::new(1, 1), &mut p));
        assert!(!food.consume(Cell::new(1, 1), &mut p));

        assert!(food.is_empty());
        assert_eq!(p.calls, vec![PaintCall::ClearFood(Cell::new(1, 1))]);
    }

    #[test]
    fn test_consume_unknown_cell_noop() {
        let mut food = FoodField::new();
        let mut p = RecordingPresenter::new();
        assert!(!food.consume(Cell::new(9, 9), &mut p));
        assert!(p.is_empty());
    }
}
