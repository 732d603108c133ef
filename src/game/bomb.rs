//! Bombs and the bomb sprite asset

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::game::constants::bomb::INLINE_BLAST_CELLS;
use crate::game::countdown::CountdownHandle;
use crate::game::grid::Cell;
use crate::game::presenter::Presenter;

/// Server-assigned bomb identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BombId(String);

impl BombId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BombId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BombId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpriteError {
    #[error("failed to read bomb sprite {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bomb sprite {0} is empty")]
    Empty(String),
}

/// Loaded bomb image, shared by every bomb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BombSprite {
    name: String,
    data: Arc<[u8]>,
}

impl BombSprite {
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read the sprite from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SpriteError> {
        let path = path.as_ref();
        let label = path.display().to_string();
        let data = tokio::fs::read(path).await.map_err(|source| SpriteError::Read {
            path: label.clone(),
            source,
        })?;

        if data.is_empty() {
            return Err(SpriteError::Empty(label));
        }

        debug!("Loaded bomb sprite {} ({} bytes)", label, data.len());
        Ok(Self::from_bytes(label, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A live bomb with its blast range and cosmetic countdown
///
/// The countdown only drives the display. Removal happens when the server
/// reports detonation.
#[derive(Debug)]
pub struct Bomb {
    id: BombId,
    center: Cell,
    /// OPTIMIZATION: blast radius tops out at 2, so 25 cells fit inline
    blast: SmallVec<[Cell; INLINE_BLAST_CELLS]>,
    seconds_left: u32,
    sprite: Option<Arc<BombSprite>>,
    countdown: CountdownHandle,
}

impl Bomb {
    pub fn new(
        id: BombId,
        center: Cell,
        blast: impl IntoIterator<Item = Cell>,
        seconds_left: u32,
        sprite: Option<Arc<BombSprite>>,
        countdown: CountdownHandle,
    ) -> Self {
        Self {
            id,
            center,
            blast: blast.into_iter().collect(),
            seconds_left,
            sprite,
            countdown,
        }
    }

    pub fn id(&self) -> &BombId {
        &self.id
    }

    pub fn center(&self) -> Cell {
        self.center
    }

    pub fn blast(&self) -> &[Cell] {
        &self.blast
    }

    pub fn seconds_left(&self) -> u32 {
        self.seconds_left
    }

    pub fn has_sprite(&self) -> bool {
        self.sprite.is_some()
    }

    pub fn countdown_active(&self) -> bool {
        self.countdown.is_active()
    }

    pub fn paint(&self, presenter: &mut dyn Presenter) {
        presenter.paint_bomb(self.center, &self.blast, self.seconds_left, self.sprite.as_deref());
    }

    /// One countdown second. Stops at zero; returns false once there is nothing left.
    pub fn tick(&mut self, presenter: &mut dyn Presenter) -> bool {
        if self.seconds_left == 0 {
            return false;
        }
        self.seconds_left -= 1;
        self.paint(presenter);
        true
    }

    /// Attach the sprite once it has loaded and repaint
    pub fn attach_sprite(&mut self, sprite: Arc<BombSprite>, presenter: &mut dyn Presenter) {
        self.sprite = Some(sprite);
        self.paint(presenter);
    }

    /// Cancel the countdown and clear the bomb from the surface.
    ///
    /// Consumes the bomb; returns whether the countdown was still running.
    pub fn detonate(mut self, presenter: &mut dyn Presenter) -> bool {
        let cancelled = self.countdown.cancel();
        presenter.clear_bomb(self.center, &self.blast);
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::countdown::{CountdownScheduler, ManualCountdowns};
    use crate::game::presenter::{PaintCall, RecordingPresenter};

    fn blast_around(center: Cell) -> Vec<Cell> {
        let mut cells = vec![center];
        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            cells.push(Cell::new(center.x + dx, center.y + dy));
        }
        cells
    }

    #[test]
    fn test_tick_stops_at_zero() {
        let mut p = RecordingPresenter::new();
        let center = Cell::new(5, 5);
        let mut bomb = Bomb::new(BombId::from("b"), center, blast_around(center), 2, None, CountdownHandle::detached());

        assert!(bomb.tick(&mut p));
        assert!(bomb.tick(&mut p));
        assert!(!bomb.tick(&mut p));
        assert_eq!(bomb.seconds_left(), 0);
        assert_eq!(p.count(|c| matches!(c, PaintCall::PaintBomb { .. })), 2);
    }

    #[test]
    fn test_detonate_cancels_once_and_clears() {
        let mut countdowns = ManualCountdowns::new();
        let id = BombId::from("b1");
        let center = Cell::new(3, 3);
        let bomb = Bomb::new(id.clone(), center, blast_around(center), 5, None, countdowns.start(&id));
        let mut p = RecordingPresenter::new();

        assert!(bomb.countdown_active());
        assert!(bomb.detonate(&mut p));

        assert_eq!(countdowns.cancel_count(&id), 1);
        assert_eq!(p.calls, vec![PaintCall::ClearBomb { center }]);
    }

    #[test]
    fn test_attach_sprite_repaints() {
        let mut p = RecordingPresenter::new();
        let center = Cell::new(1, 1);
        let mut bomb = Bomb::new(BombId::from("b"), center, [center], 3, None, CountdownHandle::detached());
        assert!(!bomb.has_sprite());

        let sprite = Arc::new(BombSprite::from_bytes("bomb.png", vec![1, 2, 3]));
        bomb.attach_sprite(sprite, &mut p);

        assert!(bomb.has_sprite());
        assert_eq!(
            p.calls,
            vec![PaintCall::PaintBomb {
                center,
                blast_cells: 1,
                seconds_left: 3,
                has_sprite: true
            }]
        );
    }

    #[tokio::test]
    async fn test_sprite_load_missing_file() {
        let err = BombSprite::load("/definitely/not/here/bomb.png").await.unwrap_err();
        assert!(matches!(err, SpriteError::Read { .. }));
    }

    #[tokio::test]
    async fn test_sprite_load_from_disk() {
        let path = std::env::temp_dir().join(format!("wormo-sprite-{}.png", std::process::id()));
        tokio::fs::write(&path, b"\x89PNG fake").await.unwrap();

        let sprite = BombSprite::load(&path).await.unwrap();
        assert_eq!(sprite.len(), 9);
        assert_eq!(&sprite.bytes()[..4], b"\x89PNG");

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
