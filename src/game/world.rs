//! World state
//!
//! Every worm, pellet and bomb a client can see. Owned by the sync controller;
//! there is exactly one per session and nothing else holds references into it.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use serde::Serialize;
use std::sync::Arc;

use crate::game::bomb::{Bomb, BombId, BombSprite};
use crate::game::food::FoodField;
use crate::game::grid::{Cell, Direction, Grid};
use crate::game::presenter::Presenter;
use crate::game::worm::{StepOutcome, Worm, WormId};

/// Result of a local (predicted) player move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerMove {
    pub step: StepOutcome,
    /// Food eaten at the new head
    pub ate: bool,
    /// New tail cell if the move triggered growth
    pub grown: Option<Cell>,
}

#[derive(Debug, Default)]
pub struct World {
    grid: Grid,
    player_id: Option<WormId>,
    worms: HashMap<WormId, Worm, FxBuildHasher>,
    food: FoodField,
    bombs: HashMap<BombId, Bomb, FxBuildHasher>,
    sprite: Option<Arc<BombSprite>>,
}

impl World {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            ..Default::default()
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn player_id(&self) -> Option<&WormId> {
        self.player_id.as_ref()
    }

    pub fn set_player_id(&mut self, id: WormId) {
        self.player_id = Some(id);
    }

    pub fn is_player(&self, id: &WormId) -> bool {
        self.player_id.as_ref() == Some(id)
    }

    pub fn player(&self) -> Option<&Worm> {
        self.player_id.as_ref().and_then(|id| self.worms.get(id))
    }

    // ---- worms ----

    pub fn worm(&self, id: &WormId) -> Option<&Worm> {
        self.worms.get(id)
    }

    pub fn worm_mut(&mut self, id: &WormId) -> Option<&mut Worm> {
        self.worms.get_mut(id)
    }

    pub fn contains_worm(&self, id: &WormId) -> bool {
        self.worms.contains_key(id)
    }

    /// Insert without painting. Returns false if the id is taken.
    pub fn insert_worm(&mut self, id: WormId, worm: Worm) -> bool {
        if self.worms.contains_key(&id) {
            return false;
        }
        self.worms.insert(id, worm);
        true
    }

    pub fn remove_worm(&mut self, id: &WormId) -> Option<Worm> {
        self.worms.remove(id)
    }

    pub fn worms(&self) -> impl Iterator<Item = (&WormId, &Worm)> {
        self.worms.iter()
    }

    pub fn worm_count(&self) -> usize {
        self.worms.len()
    }

    // ---- food ----

    pub fn food(&self) -> &FoodField {
        &self.food
    }

    pub fn food_mut(&mut self) -> &mut FoodField {
        &mut self.food
    }

    // ---- bombs ----

    pub fn bomb(&self, id: &BombId) -> Option<&Bomb> {
        self.bombs.get(id)
    }

    pub fn bomb_mut(&mut self, id: &BombId) -> Option<&mut Bomb> {
        self.bombs.get_mut(id)
    }

    pub fn contains_bomb(&self, id: &BombId) -> bool {
        self.bombs.contains_key(id)
    }

    /// Insert without painting. Returns false if the id is taken.
    pub fn insert_bomb(&mut self, bomb: Bomb) -> bool {
        if self.bombs.contains_key(bomb.id()) {
            return false;
        }
        self.bombs.insert(bomb.id().clone(), bomb);
        true
    }

    pub fn remove_bomb(&mut self, id: &BombId) -> Option<Bomb> {
        self.bombs.remove(id)
    }

    pub fn bomb_count(&self) -> usize {
        self.bombs.len()
    }

    pub fn sprite(&self) -> Option<&Arc<BombSprite>> {
        self.sprite.as_ref()
    }

    /// Store the loaded sprite and patch it into every live bomb
    pub fn attach_sprite(&mut self, sprite: Arc<BombSprite>, presenter: &mut dyn Presenter) -> usize {
        for bomb in self.bombs.values_mut() {
            bomb.attach_sprite(Arc::clone(&sprite), presenter);
        }
        self.sprite = Some(sprite);
        self.bombs.len()
    }

    /// Paint everything (after a bulk load)
    pub fn paint_all(&self, presenter: &mut dyn Presenter) {
        self.food.paint_all(presenter);
        for worm in self.worms.values() {
            worm.paint(presenter);
        }
        for bomb in self.bombs.values() {
            bomb.paint(presenter);
        }
    }

    /// Move the local player one cell, eat whatever is at the new head and
    /// grow if the food threshold is reached.
    ///
    /// Returns None when there is no local player worm.
    pub fn move_player(&mut self, direction: Direction, presenter: &mut dyn Presenter) -> Option<PlayerMove> {
        let id = self.player_id.as_ref()?;
        let worm = self.worms.get_mut(id)?;

        let step = worm.step(direction, &self.grid, presenter);
        let StepOutcome::Moved(head) = step else {
            return Some(PlayerMove {
                step,
                ate: false,
                grown: None,
            });
        };

        let ate = self.food.consume(head, presenter);
        let grown = if ate {
            worm.feed(&self.grid, presenter)
        } else {
            worm.retry_pending_growth(&self.grid, presenter)
        };

        Some(PlayerMove { step, ate, grown })
    }

    /// Serializable view of the world, sorted for stable output
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut worms: Vec<WormSnapshot> = self
            .worms
            .iter()
            .map(|(id, worm)| WormSnapshot {
                id: id.to_string(),
                segments: worm.segments().to_vec(),
                food_consumed: worm.food_consumed(),
            })
            .collect();
        worms.sort_by(|a, b| a.id.cmp(&b.id));

        let mut food: Vec<Cell> = self.food.iter().map(|(cell, _)| cell).collect();
        food.sort();

        let mut bombs: Vec<BombSnapshot> = self
            .bombs
            .values()
            .map(|bomb| BombSnapshot {
                id: bomb.id().to_string(),
                center: bomb.center(),
                seconds_left: bomb.seconds_left(),
            })
            .collect();
        bombs.sort_by(|a, b| a.id.cmp(&b.id));

        WorldSnapshot {
            player_id: self.player_id.as_ref().map(|id| id.to_string()),
            worms,
            food,
            bombs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WormSnapshot {
    pub id: String,
    pub segments: Vec<Cell>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_consumed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BombSnapshot {
    pub id: String,
    pub center: Cell,
    pub seconds_left: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldSnapshot {
    pub player_id: Option<String>,
    pub worms: Vec<WormSnapshot>,
    pub food: Vec<Cell>,
    pub bombs: Vec<BombSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::color::Color;
    use crate::game::countdown::CountdownHandle;
    use crate::game::presenter::{PaintCall, RecordingPresenter};

    fn worm(list: &[(i32, i32)]) -> Worm {
        Worm::new(
            list.iter().map(|&(x, y)| Cell::new(x, y)).collect(),
            Color::from_rgb(0, 0, 200),
            Color::from_rgb(200, 0, 0),
        )
    }

    fn world_with_player(list: &[(i32, i32)], multiplier: u32) -> World {
        let mut world = World::new(Grid::new(20, 20));
        let mut w = worm(list);
        w.enable_growth(multiplier);
        world.insert_worm(WormId::from("P1"), w);
        world.set_player_id(WormId::from("P1"));
        world
    }

    #[test]
    fn test_move_player_eats_food() {
        let mut world = world_with_player(&[(2, 2), (1, 2), (0, 2)], 2);
        let mut p = RecordingPresenter::new();
        world.food_mut().spawn(Cell::new(3, 2), Color::from_rgb(0, 255, 0), &mut p);
        p.clear();

        let mv = world.move_player(Direction::Right, &mut p).unwrap();

        assert_eq!(mv.step, StepOutcome::Moved(Cell::new(3, 2)));
        assert!(mv.ate);
        assert!(mv.grown.is_none());
        assert!(world.food().is_empty());
        assert!(p.calls.contains(&PaintCall::ClearFood(Cell::new(3, 2))));
        assert_eq!(p.last_progress(), Some((1, 6)));
    }

    #[test]
    fn test_six_pellets_grow_length_three() {
        let mut world = world_with_player(&[(2, 0), (1, 0), (0, 0)], 2);
        let mut p = RecordingPresenter::new();
        for x in 3..9 {
            world.food_mut().spawn(Cell::new(x, 0), Color::from_rgb(0, 255, 0), &mut p);
        }

        let mut grown = Vec::new();
        for _ in 0..6 {
            let mv = world.move_player(Direction::Right, &mut p).unwrap();
            assert!(mv.ate);
            grown.extend(mv.grown);
        }

        assert_eq!(grown.len(), 1);
        let player = world.player().unwrap();
        assert_eq!(player.len(), 4);
        assert_eq!(player.food_consumed(), Some(0));
        assert_eq!(player.food_needed(), Some(8));
    }

    #[test]
    fn test_move_player_out_of_bounds_noop() {
        let mut world = world_with_player(&[(19, 0), (18, 0)], 2);
        let mut p = RecordingPresenter::new();

        let mv = world.move_player(Direction::Right, &mut p).unwrap();

        assert_eq!(mv.step, StepOutcome::OutOfBounds);
        assert!(p.is_empty());
    }

    #[test]
    fn test_move_player_without_player() {
        let mut world = World::new(Grid::default());
        let mut p = RecordingPresenter::new();
        assert!(world.move_player(Direction::Up, &mut p).is_none());
    }

    #[test]
    fn test_attach_sprite_patches_existing_bombs() {
        let mut world = World::new(Grid::default());
        let mut p = RecordingPresenter::new();
        for id in ["a", "b"] {
            world.insert_bomb(Bomb::new(
                BombId::from(id),
                Cell::new(1, 1),
                [Cell::new(1, 1)],
                3,
                None,
                CountdownHandle::detached(),
            ));
        }

        let patched = world.attach_sprite(Arc::new(BombSprite::from_bytes("bomb", vec![0])), &mut p);

        assert_eq!(patched, 2);
        assert!(world.bomb(&BombId::from("a")).unwrap().has_sprite());
        assert!(world.sprite().is_some());
        assert_eq!(p.count(|c| matches!(c, PaintCall::PaintBomb { has_sprite: true, .. })), 2);
    }

    #[test]
    fn test_duplicate_inserts_rejected() {
        let mut world = World::new(Grid::default());
        assert!(world.insert_worm(WormId::from("x"), worm(&[(0, 0)])));
        assert!(!world.insert_worm(WormId::from("x"), worm(&[(5, 5)])));
        assert_eq!(world.worm(&WormId::from("x")).unwrap().head(), Cell::new(0, 0));
    }

    #[test]
    fn test_snapshot_sorted() {
        let mut world = World::new(Grid::default());
        world.insert_worm(WormId::from("b"), worm(&[(1, 1)]));
        world.insert_worm(WormId::from("a"), worm(&[(0, 0)]));
        world.set_player_id(WormId::from("a"));

        let snap = world.snapshot();
        assert_eq!(snap.player_id.as_deref(), Some("a"));
        assert_eq!(snap.worms[0].id, "a");
        assert_eq!(snap.worms[1].id, "b");

        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"player_id\":\"a\""));
    }
}
