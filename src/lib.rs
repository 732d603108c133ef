//! Wormo Client Library
//!
//! Client-side state engine for the multiplayer worm grid game: the text
//! wire protocol, the world model and the controller that keeps it in step
//! with the server.
//!
//! # Features
//!
//! - `websocket` - tokio-tungstenite transport and the headless client binary (enabled by default)
//! - `metrics_server` - Prometheus/JSON metrics endpoint (enabled by default)

pub mod config;
pub mod game;
pub mod metrics;
pub mod net;
