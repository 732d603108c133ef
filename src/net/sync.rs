//! Synchronization controller
//!
//! Owns the [`World`] and applies decoded server events to it, one at a time.
//! In predictive mode it also moves the local player as soon as a direction is
//! pressed and reports the result to the server.
//!
//! Lifecycle is `Loading -> Running`. Nothing but `INIT` is applied while
//! loading; `Running` is terminal for the lifetime of a session.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::game::bomb::{Bomb, BombId, BombSprite};
use crate::game::color::Color;
use crate::game::countdown::CountdownScheduler;
use crate::game::grid::{Cell, Direction, Grid};
use crate::game::presenter::Presenter;
use crate::game::world::{World, WorldSnapshot};
use crate::game::worm::{validate_shape, ShapeError, StepOutcome, Worm, WormId};
use crate::net::protocol::{BombRecord, ClientEvent, InitPayload, Progress, ServerEvent, WormRecord};

/// Who owns the local player's position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Server dictates every worm position; input only sends `CHANGEDIR`
    #[default]
    Authoritative,
    /// Local worm moves immediately; server positions apply to other worms only
    Predictive,
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "authoritative" => Ok(SyncMode::Authoritative),
            "predictive" => Ok(SyncMode::Predictive),
            other => Err(format!("unknown sync mode {:?}", other)),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Authoritative => f.write_str("authoritative"),
            SyncMode::Predictive => f.write_str("predictive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Worm,
    Bomb,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Worm => f.write_str("worm"),
            EntityKind::Bomb => f.write_str("bomb"),
        }
    }
}

/// Consistency violations between server events and local state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("Duplicate {kind} id {id}")]
    DuplicateId { kind: EntityKind, id: String },
    #[error("Unknown {kind} id {id}")]
    UnknownId { kind: EntityKind, id: String },
    #[error("Invalid shape for worm {id}: {reason}")]
    InvalidShape { id: String, reason: ShapeError },
    #[error("INIT received while already running")]
    AlreadyRunning,
}

impl ControllerError {
    fn duplicate(kind: EntityKind, id: impl fmt::Display) -> Self {
        ControllerError::DuplicateId { kind, id: id.to_string() }
    }

    fn unknown(kind: EntityKind, id: impl fmt::Display) -> Self {
        ControllerError::UnknownId { kind, id: id.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Running,
}

/// What `apply` did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Non-INIT event before the world was loaded
    DroppedWhileLoading,
    /// Server echo about the local player that predictive mode does not follow
    Ignored,
}

/// Controller settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub mode: SyncMode,
    pub grid: Grid,
    pub level_multiplier: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            grid: Grid::default(),
            level_multiplier: crate::game::constants::growth::LEVEL_MULTIPLIER,
        }
    }
}

pub struct SyncController<P, S> {
    settings: SyncSettings,
    phase: Phase,
    world: World,
    presenter: P,
    countdowns: S,
    rng: StdRng,
}

impl<P: Presenter, S: CountdownScheduler> SyncController<P, S> {
    pub fn new(settings: SyncSettings, presenter: P, countdowns: S) -> Self {
        Self::with_rng(settings, presenter, countdowns, StdRng::from_entropy())
    }

    /// Deterministic colours
    pub fn with_seed(settings: SyncSettings, presenter: P, countdowns: S, seed: u64) -> Self {
        Self::with_rng(settings, presenter, countdowns, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: SyncSettings, presenter: P, countdowns: S, rng: StdRng) -> Self {
        Self {
            settings,
            phase: Phase::Loading,
            world: World::new(settings.grid),
            presenter,
            countdowns,
            rng,
        }
    }

    pub fn mode(&self) -> SyncMode {
        self.settings.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.world.snapshot()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn countdowns(&self) -> &S {
        &self.countdowns
    }

    /// Apply one decoded server event
    pub fn apply(&mut self, event: ServerEvent) -> Result<ApplyOutcome, ControllerError> {
        if self.phase == Phase::Loading {
            return match event {
                ServerEvent::Init(init) => {
                    self.apply_init(init)?;
                    Ok(ApplyOutcome::Applied)
                }
                other => {
                    debug!("Dropping {} received while loading", other.name());
                    Ok(ApplyOutcome::DroppedWhileLoading)
                }
            };
        }

        match event {
            ServerEvent::Init(_) => Err(ControllerError::AlreadyRunning),
            ServerEvent::New(record) => self.apply_new(record),
            ServerEvent::Move(records) => self.apply_move(records),
            ServerEvent::SpawnFood(cells) => self.apply_spawn_food(cells),
            ServerEvent::ConsumeFood { id, cell, progress } => self.apply_consume_food(id, cell, progress),
            ServerEvent::SpawnBomb(record) => self.apply_spawn_bomb(record),
            ServerEvent::DetonateBomb { id, corrections } => self.apply_detonate(id, corrections),
            ServerEvent::Disconnect(id) => self.apply_disconnect(id),
            ServerEvent::Collide(progress) => self.apply_collide(progress),
            ServerEvent::Extend { id, cell } => self.apply_extend(id, cell),
        }
    }

    /// Handle a pressed direction. Returns the messages to send, in order.
    pub fn on_direction(&mut self, direction: Direction) -> Vec<ClientEvent> {
        if self.phase == Phase::Loading {
            debug!("Dropping direction {:?} while loading", direction);
            return Vec::new();
        }

        match self.settings.mode {
            SyncMode::Authoritative => vec![ClientEvent::ChangeDir(direction)],
            SyncMode::Predictive => {
                let Some(mv) = self.world.move_player(direction, &mut self.presenter) else {
                    debug!("No local worm to move");
                    return Vec::new();
                };

                if !matches!(mv.step, StepOutcome::Moved(_)) {
                    trace!("Local move {:?} blocked: {:?}", direction, mv.step);
                    return Vec::new();
                }

                let mut out = Vec::with_capacity(2);
                if let Some(cell) = mv.grown {
                    out.push(ClientEvent::Extend(cell));
                }
                out.push(ClientEvent::Move(direction));
                out
            }
        }
    }

    /// One countdown second for `id`. Ticks for bombs that are gone are ignored.
    pub fn tick_bomb(&mut self, id: &BombId) -> bool {
        match self.world.bomb_mut(id) {
            Some(bomb) => bomb.tick(&mut self.presenter),
            None => {
                trace!("Ignoring tick for detonated bomb {}", id);
                false
            }
        }
    }

    /// Patch the loaded bomb image into every bomb, now and later
    pub fn attach_bomb_sprite(&mut self, sprite: BombSprite) -> usize {
        let patched = self.world.attach_sprite(Arc::new(sprite), &mut self.presenter);
        debug!("Bomb sprite attached to {} live bombs", patched);
        patched
    }

    fn check_shape(&self, record: &WormRecord) -> Result<(), ControllerError> {
        validate_shape(&record.positions, self.world.grid()).map_err(|reason| ControllerError::InvalidShape {
            id: record.id.to_string(),
            reason,
        })
    }

    fn new_worm(&mut self, positions: Vec<Cell>) -> Worm {
        let body = Color::random(&mut self.rng);
        let head = Color::random(&mut self.rng);
        Worm::new(positions, body, head)
    }

    fn make_bomb(&mut self, record: BombRecord) -> Bomb {
        let grid = *self.world.grid();
        let countdown = self.countdowns.start(&record.id);
        Bomb::new(
            record.id,
            record.center,
            record.blast.into_iter().filter(|c| grid.in_bounds(*c)),
            record.seconds,
            self.world.sprite().cloned(),
            countdown,
        )
    }

    /// Stage the whole world, then swap it in. A bad INIT leaves the
    /// controller loading with nothing painted.
    fn apply_init(&mut self, init: InitPayload) -> Result<(), ControllerError> {
        let InitPayload {
            player,
            enemies,
            food,
            bombs,
        } = init;

        self.check_shape(&player)?;
        for (i, enemy) in enemies.iter().enumerate() {
            self.check_shape(enemy)?;
            if enemy.id == player.id || enemies[..i].iter().any(|e| e.id == enemy.id) {
                return Err(ControllerError::duplicate(EntityKind::Worm, &enemy.id));
            }
        }
        for (i, bomb) in bombs.iter().enumerate() {
            if bombs[..i].iter().any(|b| b.id == bomb.id) {
                return Err(ControllerError::duplicate(EntityKind::Bomb, &bomb.id));
            }
        }

        let mut staged = World::new(self.settings.grid);
        if let Some(sprite) = self.world.sprite() {
            staged.attach_sprite(Arc::clone(sprite), &mut self.presenter);
        }

        let mut player_worm = self.new_worm(player.positions);
        if self.settings.mode == SyncMode::Predictive {
            player_worm.enable_growth(self.settings.level_multiplier);
        }
        staged.insert_worm(player.id.clone(), player_worm);
        staged.set_player_id(player.id.clone());

        for enemy in enemies {
            let worm = self.new_worm(enemy.positions);
            staged.insert_worm(enemy.id, worm);
        }

        for cell in food {
            if !staged.grid().in_bounds(cell) {
                warn!("Skipping out-of-bounds food at {},{}", cell.x, cell.y);
                continue;
            }
            let color = Color::random(&mut self.rng);
            staged.food_mut().insert_silent(cell, color);
        }

        // Swap first so make_bomb sees the carried-over sprite
        self.world = staged;
        for record in bombs {
            let bomb = self.make_bomb(record);
            self.world.insert_bomb(bomb);
        }

        self.world.paint_all(&mut self.presenter);
        self.presenter.show_ready();
        if let Some(worm) = self.world.player() {
            worm.report_progress(&mut self.presenter);
        }
        self.phase = Phase::Running;

        info!(
            "Joined as {} ({} other worms, {} food, {} bombs)",
            player.id,
            self.world.worm_count() - 1,
            self.world.food().len(),
            self.world.bomb_count()
        );
        Ok(())
    }

    fn apply_new(&mut self, record: WormRecord) -> Result<ApplyOutcome, ControllerError> {
        if self.world.contains_worm(&record.id) {
            return Err(ControllerError::duplicate(EntityKind::Worm, &record.id));
        }
        self.check_shape(&record)?;

        let worm = self.new_worm(record.positions);
        worm.paint(&mut self.presenter);
        debug!("Worm {} joined", record.id);
        self.world.insert_worm(record.id, worm);
        Ok(ApplyOutcome::Applied)
    }

    fn apply_move(&mut self, records: Vec<WormRecord>) -> Result<ApplyOutcome, ControllerError> {
        let predictive = self.settings.mode == SyncMode::Predictive;

        let mut accepted = Vec::with_capacity(records.len());
        for record in records {
            if predictive && self.world.is_player(&record.id) {
                continue;
            }
            if !self.world.contains_worm(&record.id) {
                return Err(ControllerError::unknown(EntityKind::Worm, &record.id));
            }
            self.check_shape(&record)?;
            accepted.push(record);
        }

        self.replace_worms(accepted, |_| false);
        Ok(ApplyOutcome::Applied)
    }

    fn apply_spawn_food(&mut self, cells: Vec<Cell>) -> Result<ApplyOutcome, ControllerError> {
        for cell in cells {
            if !self.world.grid().in_bounds(cell) {
                warn!("Skipping out-of-bounds food at {},{}", cell.x, cell.y);
                continue;
            }
            let color = Color::random(&mut self.rng);
            self.world.food_mut().spawn(cell, color, &mut self.presenter);
        }
        Ok(ApplyOutcome::Applied)
    }

    fn apply_consume_food(&mut self, id: WormId, cell: Cell, progress: Progress) -> Result<ApplyOutcome, ControllerError> {
        self.world.food_mut().consume(cell, &mut self.presenter);

        // Predictive clients count locally
        if self.settings.mode == SyncMode::Authoritative && self.world.is_player(&id) {
            self.presenter.update_progress(progress.consumed, progress.needed);
        }
        Ok(ApplyOutcome::Applied)
    }

    fn apply_spawn_bomb(&mut self, record: BombRecord) -> Result<ApplyOutcome, ControllerError> {
        if self.world.contains_bomb(&record.id) {
            return Err(ControllerError::duplicate(EntityKind::Bomb, &record.id));
        }

        let bomb = self.make_bomb(record);
        bomb.paint(&mut self.presenter);
        debug!("Bomb {} armed at {:?}, {}s", bomb.id(), bomb.center(), bomb.seconds_left());
        self.world.insert_bomb(bomb);
        Ok(ApplyOutcome::Applied)
    }

    fn apply_detonate(&mut self, id: BombId, corrections: Vec<WormRecord>) -> Result<ApplyOutcome, ControllerError> {
        if !self.world.contains_bomb(&id) {
            return Err(ControllerError::unknown(EntityKind::Bomb, &id));
        }
        for record in &corrections {
            if !self.world.contains_worm(&record.id) {
                return Err(ControllerError::unknown(EntityKind::Worm, &record.id));
            }
            self.check_shape(record)?;
        }

        if let Some(bomb) = self.world.remove_bomb(&id) {
            bomb.detonate(&mut self.presenter);
        }

        let player = self.world.player_id().cloned();
        self.replace_worms(corrections, |worm| player.as_ref() == Some(worm));

        debug!("Bomb {} detonated", id);
        Ok(ApplyOutcome::Applied)
    }

    fn apply_disconnect(&mut self, id: WormId) -> Result<ApplyOutcome, ControllerError> {
        let worm = self
            .world
            .remove_worm(&id)
            .ok_or_else(|| ControllerError::unknown(EntityKind::Worm, &id))?;
        worm.clear(&mut self.presenter);
        debug!("Worm {} disconnected", id);
        Ok(ApplyOutcome::Applied)
    }

    fn apply_collide(&mut self, progress: Progress) -> Result<ApplyOutcome, ControllerError> {
        if self.settings.mode == SyncMode::Predictive {
            return Ok(ApplyOutcome::Ignored);
        }
        self.presenter.update_progress(progress.consumed, progress.needed);
        Ok(ApplyOutcome::Applied)
    }

    fn apply_extend(&mut self, id: WormId, cell: Cell) -> Result<ApplyOutcome, ControllerError> {
        if self.settings.mode == SyncMode::Predictive && self.world.is_player(&id) {
            return Ok(ApplyOutcome::Ignored);
        }
        if !self.world.grid().in_bounds(cell) {
            return Err(ControllerError::InvalidShape {
                id: id.to_string(),
                reason: ShapeError::OutOfBounds(cell),
            });
        }
        let grid = *self.world.grid();
        let worm = self
            .world
            .worm_mut(&id)
            .ok_or_else(|| ControllerError::unknown(EntityKind::Worm, &id))?;
        worm.append(cell, &grid, &mut self.presenter)
            .map_err(|reason| ControllerError::InvalidShape {
                id: id.to_string(),
                reason,
            })?;
        Ok(ApplyOutcome::Applied)
    }

    /// Swap in validated bodies. Every worm is vacated before any is settled
    /// so a cell passed between worms stays painted. Worms matching
    /// `show_progress` refresh the HUD afterwards.
    fn replace_worms(&mut self, records: Vec<WormRecord>, show_progress: impl Fn(&WormId) -> bool) {
        for record in &records {
            if let Some(worm) = self.world.worm(&record.id) {
                worm.vacate(&record.positions, &mut self.presenter);
            }
        }
        for record in records {
            if let Some(worm) = self.world.worm_mut(&record.id) {
                worm.settle(record.positions, &mut self.presenter);
                if show_progress(&record.id) {
                    worm.report_progress(&mut self.presenter);
                }
            }
        }
    }
}
