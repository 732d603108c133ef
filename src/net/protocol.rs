//! Text wire protocol
//!
//! A message is `<EVENT>\n<payload>`. Inside a payload, records are separated
//! by `\n`, fields by `|`, an id from its position list by the first `,`,
//! positions by `,` and the two coordinates of a position by `:`.
//!
//! Worm position lists are always head first.

use std::fmt::Write;

use crate::game::bomb::BombId;
use crate::game::grid::{Cell, Direction};
use crate::game::worm::WormId;

/// Wire event names
pub mod event {
    pub const INIT: &str = "INIT";
    pub const NEW: &str = "NEW";
    pub const MOVE: &str = "MOVE";
    pub const CHANGE_DIR: &str = "CHANGEDIR";
    pub const EXTEND: &str = "EXTEND";
    pub const SPAWN_FOOD: &str = "SPAWNFOOD";
    pub const CONSUME_FOOD: &str = "CONSUMEFOOD";
    pub const SPAWN_BOMB: &str = "SPAWNBOMB";
    pub const DETONATE_BOMB: &str = "DETBOMB";
    /// Long form accepted on decode
    pub const DETONATE_BOMB_LONG: &str = "DETONATEBOMB";
    pub const DISCONNECT: &str = "DISCONNECT";
    pub const COLLIDE: &str = "COLLIDE";
}

/// Errors produced while decoding a wire message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown event: {0:?}")]
    UnknownEvent(String),
    #[error("Malformed {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },
}

fn malformed(field: &'static str, value: &str) -> ProtocolError {
    ProtocolError::MalformedField {
        field,
        value: value.to_string(),
    }
}

/// A worm id with its head-first positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WormRecord {
    pub id: WormId,
    pub positions: Vec<Cell>,
}

impl WormRecord {
    pub fn new(id: impl Into<String>, positions: Vec<Cell>) -> Self {
        Self {
            id: WormId::new(id),
            positions,
        }
    }
}

/// A bomb as announced by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BombRecord {
    pub id: BombId,
    /// Whole seconds until detonation
    pub seconds: u32,
    pub center: Cell,
    /// Cells covered by the blast
    pub blast: Vec<Cell>,
}

/// Food progress counter as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub consumed: u32,
    pub needed: u32,
}

/// Full world state sent in reply to a client `INIT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPayload {
    pub player: WormRecord,
    pub enemies: Vec<WormRecord>,
    pub food: Vec<Cell>,
    pub bombs: Vec<BombRecord>,
}

/// Server to client events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Init(InitPayload),
    New(WormRecord),
    Move(Vec<WormRecord>),
    SpawnFood(Vec<Cell>),
    ConsumeFood { id: WormId, cell: Cell, progress: Progress },
    SpawnBomb(BombRecord),
    DetonateBomb { id: BombId, corrections: Vec<WormRecord> },
    Disconnect(WormId),
    Collide(Progress),
    /// Remote worm grew by one cell at its tail
    Extend { id: WormId, cell: Cell },
}

/// Client to server events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Init,
    ChangeDir(Direction),
    /// Predictive clients report the move they already applied
    Move(Direction),
    /// Predictive clients report the tail cell they grew into
    Extend(Cell),
}

/// Split `<EVENT>\n<payload>`; no newline means an empty payload
fn split_message(text: &str) -> (&str, &str) {
    text.split_once('\n').unwrap_or((text, ""))
}

/// Non-empty `\n`-separated records
fn records(payload: &str) -> impl Iterator<Item = &str> {
    payload.split('\n').filter(|r| !r.is_empty())
}

fn parse_u32(field: &'static str, s: &str) -> Result<u32, ProtocolError> {
    s.parse().map_err(|_| malformed(field, s))
}

fn parse_cell(s: &str) -> Result<Cell, ProtocolError> {
    let (x, y) = s.split_once(':').ok_or_else(|| malformed("position", s))?;
    let x = x.parse().map_err(|_| malformed("x coordinate", s))?;
    let y = y.parse().map_err(|_| malformed("y coordinate", s))?;
    Ok(Cell::new(x, y))
}

fn parse_positions(s: &str) -> Result<Vec<Cell>, ProtocolError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(',').map(parse_cell).collect()
}

fn parse_progress(s: &str) -> Result<Progress, ProtocolError> {
    let (consumed, needed) = s.split_once('/').ok_or_else(|| malformed("progress", s))?;
    Ok(Progress {
        consumed: parse_u32("consumed", consumed)?,
        needed: parse_u32("needed", needed)?,
    })
}

fn parse_worm_record(s: &str) -> Result<WormRecord, ProtocolError> {
    let (id, positions) = s.split_once(',').ok_or_else(|| malformed("worm record", s))?;
    if id.is_empty() {
        return Err(malformed("worm id", s));
    }
    Ok(WormRecord {
        id: WormId::new(id),
        positions: parse_positions(positions)?,
    })
}

fn parse_worm_records(payload: &str) -> Result<Vec<WormRecord>, ProtocolError> {
    records(payload).map(parse_worm_record).collect()
}

/// INIT bomb record: `id,ttl,x:y,posList`
fn parse_init_bomb(s: &str) -> Result<BombRecord, ProtocolError> {
    let mut fields = s.splitn(4, ',');
    let id = fields.next().filter(|id| !id.is_empty()).ok_or_else(|| malformed("bomb id", s))?;
    let seconds = fields.next().ok_or_else(|| malformed("bomb timer", s))?;
    let center = fields.next().ok_or_else(|| malformed("bomb position", s))?;
    let blast = fields.next().unwrap_or("");

    Ok(BombRecord {
        id: BombId::new(id),
        seconds: parse_u32("bomb timer", seconds)?,
        center: parse_cell(center)?,
        blast: parse_positions(blast)?,
    })
}

/// SPAWNBOMB payload: `id|ttl|x:y|posList`
fn parse_spawn_bomb(payload: &str) -> Result<BombRecord, ProtocolError> {
    let fields: Vec<&str> = payload.split('|').collect();
    let [id, seconds, center, blast] = fields.as_slice() else {
        return Err(malformed("bomb", payload));
    };
    if id.is_empty() {
        return Err(malformed("bomb id", payload));
    }

    Ok(BombRecord {
        id: BombId::new(*id),
        seconds: parse_u32("bomb timer", seconds)?,
        center: parse_cell(center)?,
        blast: parse_positions(blast)?,
    })
}

fn parse_init(payload: &str) -> Result<InitPayload, ProtocolError> {
    let segments: Vec<&str> = payload.split('|').collect();
    // Servers without bombs send three segments
    let (player, enemies, food, bombs) = match segments.as_slice() {
        [player, enemies, food] => (*player, *enemies, *food, ""),
        [player, enemies, food, bombs] => (*player, *enemies, *food, *bombs),
        _ => return Err(malformed("init", payload)),
    };

    Ok(InitPayload {
        player: parse_worm_record(player)?,
        enemies: parse_worm_records(enemies)?,
        food: parse_positions(food)?,
        bombs: records(bombs).map(parse_init_bomb).collect::<Result<_, _>>()?,
    })
}

fn parse_direction(s: &str) -> Result<Direction, ProtocolError> {
    Direction::from_wire(s).ok_or_else(|| malformed("direction", s))
}

fn non_empty<'a>(field: &'static str, s: &'a str) -> Result<&'a str, ProtocolError> {
    if s.is_empty() {
        Err(malformed(field, s))
    } else {
        Ok(s)
    }
}

impl ServerEvent {
    /// Parse a server message
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let (name, payload) = split_message(text);

        let event = match name {
            event::INIT => ServerEvent::Init(parse_init(payload)?),
            event::NEW => ServerEvent::New(parse_worm_record(payload)?),
            event::MOVE => ServerEvent::Move(parse_worm_records(payload)?),
            event::SPAWN_FOOD => ServerEvent::SpawnFood(parse_positions(payload)?),
            event::CONSUME_FOOD => {
                let (head, progress) = payload.split_once('|').ok_or_else(|| malformed("consume food", payload))?;
                let (id, cell) = head.split_once(',').ok_or_else(|| malformed("consume food", payload))?;
                ServerEvent::ConsumeFood {
                    id: WormId::new(non_empty("worm id", id)?),
                    cell: parse_cell(cell)?,
                    progress: parse_progress(progress)?,
                }
            }
            event::SPAWN_BOMB => ServerEvent::SpawnBomb(parse_spawn_bomb(payload)?),
            event::DETONATE_BOMB | event::DETONATE_BOMB_LONG => {
                let (id, corrections) = payload.split_once('|').unwrap_or((payload, ""));
                ServerEvent::DetonateBomb {
                    id: BombId::new(non_empty("bomb id", id)?),
                    corrections: parse_worm_records(corrections)?,
                }
            }
            event::DISCONNECT => ServerEvent::Disconnect(WormId::new(non_empty("worm id", payload)?)),
            event::COLLIDE => ServerEvent::Collide(parse_progress(payload)?),
            event::EXTEND => {
                let (id, cell) = payload.split_once(',').ok_or_else(|| malformed("extend", payload))?;
                ServerEvent::Extend {
                    id: WormId::new(non_empty("worm id", id)?),
                    cell: parse_cell(cell)?,
                }
            }
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };

        Ok(event)
    }

    /// Wire event name
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Init(_) => event::INIT,
            ServerEvent::New(_) => event::NEW,
            ServerEvent::Move(_) => event::MOVE,
            ServerEvent::SpawnFood(_) => event::SPAWN_FOOD,
            ServerEvent::ConsumeFood { .. } => event::CONSUME_FOOD,
            ServerEvent::SpawnBomb(_) => event::SPAWN_BOMB,
            ServerEvent::DetonateBomb { .. } => event::DETONATE_BOMB,
            ServerEvent::Disconnect(_) => event::DISCONNECT,
            ServerEvent::Collide(_) => event::COLLIDE,
            ServerEvent::Extend { .. } => event::EXTEND,
        }
    }

    /// Serialize to wire text
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(self.name());
        out.push('\n');

        match self {
            ServerEvent::Init(init) => {
                write_worm_record(&mut out, &init.player);
                out.push('|');
                write_worm_records(&mut out, &init.enemies);
                out.push('|');
                write_positions(&mut out, &init.food);
                out.push('|');
                for (i, bomb) in init.bombs.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    let _ = write!(out, "{},{},", bomb.id, bomb.seconds);
                    write_cell(&mut out, bomb.center);
                    out.push(',');
                    write_positions(&mut out, &bomb.blast);
                }
            }
            ServerEvent::New(record) => write_worm_record(&mut out, record),
            ServerEvent::Move(records) => write_worm_records(&mut out, records),
            ServerEvent::SpawnFood(cells) => write_positions(&mut out, cells),
            ServerEvent::ConsumeFood { id, cell, progress } => {
                let _ = write!(out, "{},", id);
                write_cell(&mut out, *cell);
                let _ = write!(out, "|{}/{}", progress.consumed, progress.needed);
            }
            ServerEvent::SpawnBomb(bomb) => {
                let _ = write!(out, "{}|{}|", bomb.id, bomb.seconds);
                write_cell(&mut out, bomb.center);
                out.push('|');
                write_positions(&mut out, &bomb.blast);
            }
            ServerEvent::DetonateBomb { id, corrections } => {
                out.push_str(id.as_str());
                if !corrections.is_empty() {
                    out.push('|');
                    write_worm_records(&mut out, corrections);
                }
            }
            ServerEvent::Disconnect(id) => out.push_str(id.as_str()),
            ServerEvent::Collide(progress) => {
                let _ = write!(out, "{}/{}", progress.consumed, progress.needed);
            }
            ServerEvent::Extend { id, cell } => {
                let _ = write!(out, "{},", id);
                write_cell(&mut out, *cell);
            }
        }

        out
    }
}

impl ClientEvent {
    /// Parse a client message (used by tooling and tests)
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let (name, payload) = split_message(text);
        match name {
            event::INIT => Ok(ClientEvent::Init),
            event::CHANGE_DIR => Ok(ClientEvent::ChangeDir(parse_direction(payload)?)),
            event::MOVE => Ok(ClientEvent::Move(parse_direction(payload)?)),
            event::EXTEND => Ok(ClientEvent::Extend(parse_cell(payload)?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Init => event::INIT,
            ClientEvent::ChangeDir(_) => event::CHANGE_DIR,
            ClientEvent::Move(_) => event::MOVE,
            ClientEvent::Extend(_) => event::EXTEND,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            ClientEvent::Init => event::INIT.to_string(),
            ClientEvent::ChangeDir(dir) | ClientEvent::Move(dir) => {
                format!("{}\n{}", self.name(), dir.as_char())
            }
            ClientEvent::Extend(cell) => format!("{}\n{}:{}", event::EXTEND, cell.x, cell.y),
        }
    }
}

fn write_cell(out: &mut String, cell: Cell) {
    let _ = write!(out, "{}:{}", cell.x, cell.y);
}

fn write_positions(out: &mut String, cells: &[Cell]) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_cell(out, *cell);
    }
}

fn write_worm_record(out: &mut String, record: &WormRecord) {
    out.push_str(record.id.as_str());
    out.push(',');
    write_positions(out, &record.positions);
}

fn write_worm_records(out: &mut String, records: &[WormRecord]) {
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        write_worm_record(out, record);
    }
}
