//! Presentation adapter contract
//!
//! The engine never paints directly. Every visible change goes through a
//! [`Presenter`], implemented by whatever surface the client renders on.

use tracing::{debug, trace};

use crate::game::bomb::BombSprite;
use crate::game::color::Color;
use crate::game::grid::Cell;

/// Rendering surface consumed by the entity model
///
/// Worm cells and food are separate layers: painting a worm over a food
/// cell must not erase the food, and clearing one must not clear the other.
pub trait Presenter {
    /// Paint a worm segment
    fn paint_cell(&mut self, cell: Cell, color: Color);
    /// Clear a worm segment
    fn clear_cell(&mut self, cell: Cell);
    /// Show a food pellet
    fn paint_food(&mut self, cell: Cell, color: Color);
    /// Remove a food pellet
    fn clear_food(&mut self, cell: Cell);
    /// Update the local player's growth progress display
    fn update_progress(&mut self, consumed: u32, needed: u32);
    /// Hide the loading screen once the world is initialised
    fn show_ready(&mut self);
    /// Draw (or redraw) a bomb with its blast range and countdown
    fn paint_bomb(&mut self, center: Cell, blast: &[Cell], seconds_left: u32, sprite: Option<&BombSprite>);
    /// Remove a bomb and its blast range overlay
    fn clear_bomb(&mut self, center: Cell, blast: &[Cell]);
}

/// A single recorded presenter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaintCall {
    PaintCell(Cell, Color),
    ClearCell(Cell),
    PaintFood(Cell, Color),
    ClearFood(Cell),
    Progress { consumed: u32, needed: u32 },
    Ready,
    PaintBomb { center: Cell, blast_cells: usize, seconds_left: u32, has_sprite: bool },
    ClearBomb { center: Cell },
}

/// Presenter that records every call, for tests and replay tooling
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub calls: Vec<PaintCall>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all recorded calls
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Last progress update, if any
    pub fn last_progress(&self) -> Option<(u32, u32)> {
        self.calls.iter().rev().find_map(|c| match c {
            PaintCall::Progress { consumed, needed } => Some((*consumed, *needed)),
            _ => None,
        })
    }

    /// Number of calls matching a predicate
    pub fn count(&self, pred: impl Fn(&PaintCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl Presenter for RecordingPresenter {
    fn paint_cell(&mut self, cell: Cell, color: Color) {
        self.calls.push(PaintCall::PaintCell(cell, color));
    }

    fn clear_cell(&mut self, cell: Cell) {
        self.calls.push(PaintCall::ClearCell(cell));
    }

    fn paint_food(&mut self, cell: Cell, color: Color) {
        self.calls.push(PaintCall::PaintFood(cell, color));
    }

    fn clear_food(&mut self, cell: Cell) {
        self.calls.push(PaintCall::ClearFood(cell));
    }

    fn update_progress(&mut self, consumed: u32, needed: u32) {
        self.calls.push(PaintCall::Progress { consumed, needed });
    }

    fn show_ready(&mut self) {
        self.calls.push(PaintCall::Ready);
    }

    fn paint_bomb(&mut self, center: Cell, blast: &[Cell], seconds_left: u32, sprite: Option<&BombSprite>) {
        self.calls.push(PaintCall::PaintBomb {
            center,
            blast_cells: blast.len(),
            seconds_left,
            has_sprite: sprite.is_some(),
        });
    }

    fn clear_bomb(&mut self, center: Cell, _blast: &[Cell]) {
        self.calls.push(PaintCall::ClearBomb { center });
    }
}

/// Headless presenter that logs paint calls through `tracing`
#[derive(Debug, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn paint_cell(&mut self, cell: Cell, color: Color) {
        trace!("Adding colour {} to {},{}", color, cell.x, cell.y);
    }

    fn clear_cell(&mut self, cell: Cell) {
        trace!("Removing colour from {},{}", cell.x, cell.y);
    }

    fn paint_food(&mut self, cell: Cell, color: Color) {
        trace!("Adding food {} to {},{}", color, cell.x, cell.y);
    }

    fn clear_food(&mut self, cell: Cell) {
        trace!("Removing food from {},{}", cell.x, cell.y);
    }

    fn update_progress(&mut self, consumed: u32, needed: u32) {
        debug!("Progress {}/{}", consumed, needed);
    }

    fn show_ready(&mut self) {
        debug!("World ready");
    }

    fn paint_bomb(&mut self, center: Cell, blast: &[Cell], seconds_left: u32, sprite: Option<&BombSprite>) {
        trace!(
            "Bomb at {},{} ({} cells) detonates in {}s{}",
            center.x,
            center.y,
            blast.len(),
            seconds_left,
            if sprite.is_some() { "" } else { " [no sprite]" }
        );
    }

    fn clear_bomb(&mut self, center: Cell, _blast: &[Cell]) {
        trace!("Clearing bomb at {},{}", center.x, center.y);
    }
}
