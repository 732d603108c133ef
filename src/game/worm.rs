//! Worm entity
//!
//! A worm is an ordered list of cells with the head at index 0 and the tail at
//! the last index. The same convention is used on the wire. Local movement
//! shifts segments in place and only repaints the cells whose role changed.

use hashbrown::HashSet;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::game::color::Color;
use crate::game::constants::growth::food_needed;
use crate::game::grid::{Cell, Direction, Grid};
use crate::game::presenter::Presenter;

/// Server-assigned worm identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WormId(String);

impl WormId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WormId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reasons a position list cannot be a worm body
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("worm has no segments")]
    Empty,
    #[error("segment {0:?} is out of bounds")]
    OutOfBounds(Cell),
    #[error("segment {0:?} appears more than once")]
    Overlap(Cell),
    #[error("segments {from:?} and {to:?} are not adjacent")]
    Gap { from: Cell, to: Cell },
}

/// Check that `segments` is a valid worm body on `grid`.
///
/// Every cell must be in bounds, cells must be pairwise distinct, and
/// consecutive cells must be Manhattan-adjacent. The only tolerated repeat is
/// a run of copies of the tail cell at the very end: a server that grows a worm
/// by duplicating its tail reports that stacked tail until the next move
/// unfolds it.
pub fn validate_shape(segments: &[Cell], grid: &Grid) -> Result<(), ShapeError> {
    let Some(&tail) = segments.last() else {
        return Err(ShapeError::Empty);
    };

    if let Some(&cell) = segments.iter().find(|c| !grid.in_bounds(**c)) {
        return Err(ShapeError::OutOfBounds(cell));
    }

    let mut body_end = segments.len();
    while body_end > 1 && segments[body_end - 2] == tail {
        body_end -= 1;
    }
    let body = &segments[..body_end];

    let mut seen: HashSet<Cell, FxBuildHasher> = HashSet::with_capacity_and_hasher(body.len(), FxBuildHasher);
    for &cell in body {
        if !seen.insert(cell) {
            return Err(ShapeError::Overlap(cell));
        }
    }

    for pair in body.windows(2) {
        if pair[0].manhattan(pair[1]) != 1 {
            return Err(ShapeError::Gap { from: pair[0], to: pair[1] });
        }
    }

    Ok(())
}

/// Result of a single local step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Worm moved; carries the new head cell
    Moved(Cell),
    /// Candidate head was off the grid, nothing changed
    OutOfBounds,
    /// Candidate head was on the worm's own body, nothing changed
    SelfCollision,
}

/// Food progress for the locally predicted worm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Growth {
    consumed: u32,
    multiplier: u32,
    /// Threshold reached but no free cell next to the tail yet
    pending: bool,
}

/// A worm on the grid
#[derive(Debug, Clone)]
pub struct Worm {
    segments: Vec<Cell>,
    body_color: Color,
    head_color: Color,
    growth: Option<Growth>,
}

impl Worm {
    /// Create a worm from head-first segments. Does not paint.
    pub fn new(segments: Vec<Cell>, body_color: Color, head_color: Color) -> Self {
        Self {
            segments,
            body_color,
            head_color,
            growth: None,
        }
    }

    /// Track food consumption for this worm (local player in predictive mode)
    pub fn enable_growth(&mut self, multiplier: u32) {
        self.growth = Some(Growth {
            consumed: 0,
            multiplier,
            pending: false,
        });
    }

    pub fn segments(&self) -> &[Cell] {
        &self.segments
    }

    pub fn head(&self) -> Cell {
        self.segments[0]
    }

    pub fn tail(&self) -> Cell {
        self.segments[self.segments.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn occupies(&self, cell: Cell) -> bool {
        self.segments.contains(&cell)
    }

    pub fn body_color(&self) -> Color {
        self.body_color
    }

    pub fn head_color(&self) -> Color {
        self.head_color
    }

    /// Food eaten since the last growth (None unless growth is tracked)
    pub fn food_consumed(&self) -> Option<u32> {
        self.growth.map(|g| g.consumed)
    }

    /// Food required to grow at the current length (None unless growth is tracked)
    pub fn food_needed(&self) -> Option<u32> {
        self.growth.map(|g| food_needed(self.len(), g.multiplier))
    }

    pub fn paint(&self, presenter: &mut dyn Presenter) {
        for &cell in self.segments.iter().skip(1) {
            presenter.paint_cell(cell, self.body_color);
        }
        if let Some(&head) = self.segments.first() {
            presenter.paint_cell(head, self.head_color);
        }
    }

    pub fn clear(&self, presenter: &mut dyn Presenter) {
        for (i, &cell) in self.segments.iter().enumerate() {
            // Stacked tail copies share one cell
            if i > 0 && self.segments[i - 1] == cell {
                continue;
            }
            presenter.clear_cell(cell);
        }
    }

    /// Move one cell in `direction`.
    ///
    /// Every segment takes its predecessor's cell; the count never changes.
    /// Out-of-bounds and self-intersecting steps are silent no-ops with no
    /// presenter calls.
    pub fn step(&mut self, direction: Direction, grid: &Grid, presenter: &mut dyn Presenter) -> StepOutcome {
        let old_head = self.head();
        let candidate = old_head.offset(direction);

        if !grid.in_bounds(candidate) {
            return StepOutcome::OutOfBounds;
        }

        // After the shift the old tail is vacated, everything else stays occupied
        let n = self.segments.len();
        if self.segments[..n - 1].contains(&candidate) {
            return StepOutcome::SelfCollision;
        }

        let old_tail = self.tail();
        let tail_stays = n >= 2 && self.segments[n - 2] == old_tail;

        self.segments.rotate_right(1);
        self.segments[0] = candidate;

        if !tail_stays {
            presenter.clear_cell(old_tail);
        }
        if n > 1 {
            presenter.paint_cell(old_head, self.body_color);
        }
        presenter.paint_cell(candidate, self.head_color);

        StepOutcome::Moved(candidate)
    }

    /// Grow by one segment next to the tail without shifting the body.
    ///
    /// Picks the first cell of the tail's 8-neighbourhood that is free of this
    /// worm. Returns None when no such cell exists.
    pub fn extend(&mut self, grid: &Grid, presenter: &mut dyn Presenter) -> Option<Cell> {
        let tail = self.tail();
        let cell = grid
            .neighbors8(tail)
            .into_iter()
            .find(|c| !self.segments.contains(c))?;

        self.segments.push(cell);
        presenter.paint_cell(cell, self.body_color);
        Some(cell)
    }

    /// Check that `cell` could become the new tail: in bounds, free of this
    /// worm and in the tail's 8-neighbourhood
    pub fn check_append(&self, cell: Cell, grid: &Grid) -> Result<(), ShapeError> {
        if !grid.in_bounds(cell) {
            return Err(ShapeError::OutOfBounds(cell));
        }
        if self.occupies(cell) {
            return Err(ShapeError::Overlap(cell));
        }
        let tail = self.tail();
        if !grid.neighbors8(tail).contains(&cell) {
            return Err(ShapeError::Gap { from: tail, to: cell });
        }
        Ok(())
    }

    /// Append a server-chosen tail cell (remote extension). The worm is left
    /// untouched if the cell fails [`Worm::check_append`].
    pub fn append(&mut self, cell: Cell, grid: &Grid, presenter: &mut dyn Presenter) -> Result<(), ShapeError> {
        self.check_append(cell, grid)?;
        self.segments.push(cell);
        presenter.paint_cell(cell, self.body_color);
        Ok(())
    }

    /// Clear the cells a new server-provided body `next` no longer covers.
    ///
    /// Cells that stay occupied are repainted by [`Worm::settle`] rather than
    /// cleared, so no cell flickers through an empty state. When several worms
    /// change in one message, vacate all of them before settling any, so a
    /// cell handed from one worm to another ends up painted.
    pub fn vacate(&self, next: &[Cell], presenter: &mut dyn Presenter) {
        let next: HashSet<Cell, FxBuildHasher> = next.iter().copied().collect();
        for (i, &cell) in self.segments.iter().enumerate() {
            if next.contains(&cell) || (i > 0 && self.segments[i - 1] == cell) {
                continue;
            }
            presenter.clear_cell(cell);
        }
    }

    /// Take the new body, paint it and restart the growth counter
    pub fn settle(&mut self, positions: Vec<Cell>, presenter: &mut dyn Presenter) {
        self.segments = positions;
        self.paint(presenter);

        // Length changed under us (e.g. blast truncation): progress restarts
        if let Some(growth) = self.growth.as_mut() {
            growth.consumed = 0;
            growth.pending = false;
        }
    }

    /// Count one eaten pellet and grow if the threshold is reached.
    ///
    /// Returns the new tail cell when growth happened. No-op for worms without
    /// growth tracking.
    pub fn feed(&mut self, grid: &Grid, presenter: &mut dyn Presenter) -> Option<Cell> {
        let growth = self.growth.as_mut()?;
        let needed = food_needed(self.segments.len(), growth.multiplier);
        growth.consumed = (growth.consumed + 1).min(needed);

        let grown = if growth.consumed >= needed {
            self.try_grow(grid, presenter)
        } else {
            None
        };

        self.report_progress(presenter);
        grown
    }

    /// Retry a growth that previously found no free cell
    pub fn retry_pending_growth(&mut self, grid: &Grid, presenter: &mut dyn Presenter) -> Option<Cell> {
        if !self.growth.is_some_and(|g| g.pending) {
            return None;
        }
        let grown = self.try_grow(grid, presenter);
        if grown.is_some() {
            self.report_progress(presenter);
        }
        grown
    }

    fn try_grow(&mut self, grid: &Grid, presenter: &mut dyn Presenter) -> Option<Cell> {
        let grown = self.extend(grid, presenter);
        if let Some(growth) = self.growth.as_mut() {
            if grown.is_some() {
                growth.consumed = 0;
                growth.pending = false;
            } else {
                growth.pending = true;
            }
        }
        grown
    }

    pub fn report_progress(&self, presenter: &mut dyn Presenter) {
        if let (Some(consumed), Some(needed)) = (self.food_consumed(), self.food_needed()) {
            presenter.update_progress(consumed, needed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::presenter::{PaintCall, RecordingPresenter};

    fn cells(list: &[(i32, i32)]) -> Vec<Cell> {
        list.iter().map(|&(x, y)| Cell::new(x, y)).collect()
    }

    fn worm(list: &[(i32, i32)]) -> Worm {
        Worm::new(cells(list), Color::from_rgb(0, 0, 255), Color::from_rgb(255, 0, 0))
    }

    fn adjacent(w: &Worm) -> bool {
        w.segments().windows(2).all(|p| p[0].manhattan(p[1]) == 1)
    }

    #[test]
    fn test_validate_shape_ok() {
        let grid = Grid::new(10, 10);
        assert!(validate_shape(&cells(&[(0, 0), (1, 0), (2, 0)]), &grid).is_ok());
        assert!(validate_shape(&cells(&[(4, 4)]), &grid).is_ok());
    }

    #[test]
    fn test_validate_shape_rejects_revisit() {
        let grid = Grid::new(10, 10);
        let err = validate_shape(&cells(&[(1, 0), (0, 0), (1, 0)]), &grid).unwrap_err();
        assert_eq!(err, ShapeError::Overlap(Cell::new(1, 0)));
    }

    #[test]
    fn test_validate_shape_rejects_gap_and_bounds() {
        let grid = Grid::new(10, 10);
        assert_eq!(
            validate_shape(&cells(&[(0, 0), (2, 0)]), &grid),
            Err(ShapeError::Gap { from: Cell::new(0, 0), to: Cell::new(2, 0) })
        );
        assert_eq!(
            validate_shape(&cells(&[(0, 0), (-1, 0)]), &grid),
            Err(ShapeError::OutOfBounds(Cell::new(-1, 0)))
        );
        assert_eq!(validate_shape(&[], &grid), Err(ShapeError::Empty));
    }

    #[test]
    fn test_validate_shape_allows_stacked_tail() {
        let grid = Grid::new(10, 10);
        assert!(validate_shape(&cells(&[(0, 0), (1, 0), (2, 0), (2, 0)]), &grid).is_ok());
        // A repeat anywhere else is still an overlap
        assert!(validate_shape(&cells(&[(0, 0), (0, 0), (1, 0)]), &grid).is_err());
    }

    #[test]
    fn test_step_shifts_segments() {
        let grid = Grid::new(10, 10);
        let mut w = worm(&[(2, 0), (1, 0), (0, 0)]);
        let mut p = RecordingPresenter::new();

        let outcome = w.step(Direction::Down, &grid, &mut p);

        assert_eq!(outcome, StepOutcome::Moved(Cell::new(2, 1)));
        assert_eq!(w.segments(), cells(&[(2, 1), (2, 0), (1, 0)]).as_slice());
        assert_eq!(w.len(), 3);
        assert!(adjacent(&w));
        assert_eq!(
            p.calls,
            vec![
                PaintCall::ClearCell(Cell::new(0, 0)),
                PaintCall::PaintCell(Cell::new(2, 0), w.body_color()),
                PaintCall::PaintCell(Cell::new(2, 1), w.head_color()),
            ]
        );
    }

    #[test]
    fn test_step_out_of_bounds_is_noop() {
        let grid = Grid::new(10, 10);
        let mut w = worm(&[(9, 5), (8, 5), (7, 5)]);
        let before = w.segments().to_vec();
        let mut p = RecordingPresenter::new();

        assert_eq!(w.step(Direction::Right, &grid, &mut p), StepOutcome::OutOfBounds);
        assert_eq!(w.segments(), before.as_slice());
        assert!(p.is_empty());
    }

    #[test]
    fn test_step_into_neck_is_noop() {
        let grid = Grid::new(10, 10);
        let mut w = worm(&[(2, 0), (1, 0), (0, 0)]);
        let mut p = RecordingPresenter::new();

        assert_eq!(w.step(Direction::Left, &grid, &mut p), StepOutcome::SelfCollision);
        assert!(p.is_empty());
    }

    #[test]
    fn test_step_into_vacating_tail_allowed() {
        let grid = Grid::new(10, 10);
        // 2x2 loop: head can chase its own tail
        let mut w = worm(&[(0, 0), (1, 0), (1, 1), (0, 1)]);
        let mut p = RecordingPresenter::new();

        assert_eq!(w.step(Direction::Down, &grid, &mut p), StepOutcome::Moved(Cell::new(0, 1)));
        assert_eq!(w.segments(), cells(&[(0, 1), (0, 0), (1, 0), (1, 1)]).as_slice());
    }

    #[test]
    fn test_segment_count_invariant_over_walk() {
        let grid = Grid::new(8, 8);
        let mut w = worm(&[(3, 3), (2, 3), (1, 3)]);
        let mut p = RecordingPresenter::new();
        let path = [
            Direction::Up, Direction::Up, Direction::Right, Direction::Right,
            Direction::Down, Direction::Down, Direction::Down, Direction::Left,
            Direction::Up, Direction::Right, Direction::Right, Direction::Right,
            Direction::Right, Direction::Right, Direction::Right,
        ];
        for dir in path {
            w.step(dir, &grid, &mut p);
            assert_eq!(w.len(), 3);
            assert!(adjacent(&w));
            assert!(validate_shape(w.segments(), &grid).is_ok());
        }
    }

    #[test]
    fn test_extend_picks_first_free_neighbour() {
        let grid = Grid::new(10, 10);
        let mut w = worm(&[(2, 1), (1, 1)]);
        let mut p = RecordingPresenter::new();

        // neighbours of (1,1) in scan order start at (0,0)
        assert_eq!(w.extend(&grid, &mut p), Some(Cell::new(0, 0)));
        assert_eq!(w.len(), 3);
        assert_eq!(w.segments()[..2], cells(&[(2, 1), (1, 1)])[..]);
    }

    #[test]
    fn test_extend_skips_own_cells() {
        let grid = Grid::new(2, 2);
        let mut w = worm(&[(1, 0), (0, 0), (0, 1)]);
        let mut p = RecordingPresenter::new();

        assert_eq!(w.extend(&grid, &mut p), Some(Cell::new(1, 1)));
        // grid is now full
        assert_eq!(w.extend(&grid, &mut p), None);
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn test_growth_law_length_three() {
        let grid = Grid::new(20, 20);
        let mut w = worm(&[(5, 5), (4, 5), (3, 5)]);
        w.enable_growth(2);
        let mut p = RecordingPresenter::new();

        assert_eq!(w.food_needed(), Some(6));
        for i in 1..6 {
            assert!(w.feed(&grid, &mut p).is_none());
            assert_eq!(w.food_consumed(), Some(i));
        }
        assert!(w.feed(&grid, &mut p).is_some());
        assert_eq!(w.len(), 4);
        assert_eq!(w.food_consumed(), Some(0));
        assert_eq!(w.food_needed(), Some(8));
        assert_eq!(p.last_progress(), Some((0, 8)));
    }

    #[test]
    fn test_growth_deferred_when_boxed_in() {
        let grid = Grid::new(2, 1);
        let mut w = worm(&[(1, 0), (0, 0)]);
        w.enable_growth(1);
        let mut p = RecordingPresenter::new();

        // needs 2, but there is nowhere to grow
        assert!(w.feed(&grid, &mut p).is_none());
        assert!(w.feed(&grid, &mut p).is_none());
        assert_eq!(w.food_consumed(), Some(2));
        assert!(w.retry_pending_growth(&grid, &mut p).is_none());
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn test_feed_without_growth_tracking() {
        let grid = Grid::new(10, 10);
        let mut w = worm(&[(0, 0)]);
        let mut p = RecordingPresenter::new();
        assert!(w.feed(&grid, &mut p).is_none());
        assert!(p.is_empty());
    }

    #[test]
    fn test_append_checks_the_new_tail() {
        let grid = Grid::new(10, 10);
        let mut w = worm(&[(2, 0), (1, 0), (0, 0)]);
        let mut p = RecordingPresenter::new();

        assert_eq!(w.append(Cell::new(1, 0), &grid, &mut p), Err(ShapeError::Overlap(Cell::new(1, 0))));
        assert_eq!(
            w.append(Cell::new(5, 5), &grid, &mut p),
            Err(ShapeError::Gap { from: Cell::new(0, 0), to: Cell::new(5, 5) })
        );
        assert_eq!(w.append(Cell::new(-1, 0), &grid, &mut p), Err(ShapeError::OutOfBounds(Cell::new(-1, 0))));
        assert_eq!(w.len(), 3);
        assert!(p.is_empty());

        assert_eq!(w.append(Cell::new(0, 1), &grid, &mut p), Ok(()));
        assert_eq!(w.tail(), Cell::new(0, 1));
        assert!(w.occupies(Cell::new(0, 1)));
        assert_eq!(p.calls, vec![PaintCall::PaintCell(Cell::new(0, 1), w.body_color())]);
    }

    #[test]
    fn test_vacate_clears_only_vacated_cells() {
        let mut w = worm(&[(2, 0), (1, 0), (0, 0)]);
        let mut p = RecordingPresenter::new();

        let next = cells(&[(3, 0), (2, 0), (1, 0)]);
        w.vacate(&next, &mut p);
        w.settle(next, &mut p);

        assert_eq!(p.count(|c| matches!(c, PaintCall::ClearCell(_))), 1);
        assert!(p.calls.contains(&PaintCall::ClearCell(Cell::new(0, 0))));
        assert!(p.calls.contains(&PaintCall::PaintCell(Cell::new(3, 0), w.head_color())));
        assert_eq!(w.head(), Cell::new(3, 0));
    }

    #[test]
    fn test_clear_skips_stacked_tail() {
        let w = worm(&[(0, 0), (1, 0), (1, 0)]);
        let mut p = RecordingPresenter::new();
        w.clear(&mut p);
        assert_eq!(p.calls.len(), 2);
    }
}
