use std::path::PathBuf;
use std::time::Duration;

use crate::game::constants::{bomb, grid, growth, net};
use crate::game::grid::Grid;
use crate::net::sync::{SyncMode, SyncSettings};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the game server
    pub server_url: String,
    /// Grid width in cells
    pub grid_cols: i32,
    /// Grid height in cells
    pub grid_rows: i32,
    /// Food needed per segment before growing
    pub level_multiplier: u32,
    /// Who owns the local worm's position
    pub sync_mode: SyncMode,
    /// Bomb image to load at startup
    pub bomb_sprite_path: Option<PathBuf>,
    /// Serve metrics on this port (disabled if unset)
    pub metrics_port: Option<u16>,
    /// Bomb countdown period
    pub countdown_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: net::DEFAULT_SERVER_URL.to_string(),
            grid_cols: grid::COLS,
            grid_rows: grid::ROWS,
            level_multiplier: growth::LEVEL_MULTIPLIER,
            sync_mode: SyncMode::default(),
            bomb_sprite_path: None,
            metrics_port: None,
            countdown_interval: bomb::COUNTDOWN_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("SERVER_URL") {
            if url.starts_with("ws://") || url.starts_with("wss://") {
                config.server_url = url;
            } else {
                tracing::warn!("Invalid SERVER_URL '{}', using default", url);
            }
        }

        if let Some(cols) = lookup("GRID_COLS") {
            match cols.parse::<i32>() {
                Ok(parsed) if parsed > 0 && parsed <= grid::MAX_DIMENSION => config.grid_cols = parsed,
                Ok(_) => tracing::warn!("GRID_COLS must be 1-{}, using default", grid::MAX_DIMENSION),
                Err(_) => tracing::warn!("Invalid GRID_COLS '{}', using default", cols),
            }
        }

        if let Some(rows) = lookup("GRID_ROWS") {
            match rows.parse::<i32>() {
                Ok(parsed) if parsed > 0 && parsed <= grid::MAX_DIMENSION => config.grid_rows = parsed,
                Ok(_) => tracing::warn!("GRID_ROWS must be 1-{}, using default", grid::MAX_DIMENSION),
                Err(_) => tracing::warn!("Invalid GRID_ROWS '{}', using default", rows),
            }
        }

        if let Some(multiplier) = lookup("LEVEL_MULTIPLIER") {
            match multiplier.parse::<u32>() {
                Ok(parsed) if parsed > 0 => config.level_multiplier = parsed,
                Ok(_) => tracing::warn!("LEVEL_MULTIPLIER must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid LEVEL_MULTIPLIER '{}', using default", multiplier),
            }
        }

        if let Some(mode) = lookup("SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => config.sync_mode = parsed,
                Err(e) => tracing::warn!("Invalid SYNC_MODE: {}, using default", e),
            }
        }

        if let Some(path) = lookup("BOMB_SPRITE_PATH") {
            if !path.is_empty() {
                config.bomb_sprite_path = Some(PathBuf::from(path));
            }
        }

        if let Some(port) = lookup("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.metrics_port = Some(parsed),
                Ok(_) => tracing::warn!("METRICS_PORT must be > 0, metrics disabled"),
                Err(_) => tracing::warn!("Invalid METRICS_PORT '{}', metrics disabled", port),
            }
        }

        if let Some(ms) = lookup("COUNTDOWN_INTERVAL_MS") {
            match ms.parse::<u64>() {
                Ok(parsed) if parsed > 0 => config.countdown_interval = Duration::from_millis(parsed),
                Ok(_) => tracing::warn!("COUNTDOWN_INTERVAL_MS must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid COUNTDOWN_INTERVAL_MS '{}', using default", ms),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(format!("server_url must be a ws:// or wss:// URL, got {}", self.server_url));
        }
        if self.grid_cols <= 0 || self.grid_rows <= 0 {
            return Err("grid dimensions must be positive".to_string());
        }
        if self.grid_cols > grid::MAX_DIMENSION || self.grid_rows > grid::MAX_DIMENSION {
            return Err(format!("grid dimensions cannot exceed {}", grid::MAX_DIMENSION));
        }
        if self.level_multiplier == 0 {
            return Err("level_multiplier must be at least 1".to_string());
        }
        if self.countdown_interval.is_zero() {
            return Err("countdown_interval cannot be zero".to_string());
        }
        Ok(())
    }

    pub fn grid(&self) -> Grid {
        Grid::new(self.grid_cols, self.grid_rows)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            mode: self.sync_mode,
            grid: self.grid(),
            level_multiplier: self.level_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> ClientConfig {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ClientConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "ws://127.0.0.1:8001");
        assert_eq!(config.grid(), Grid::new(40, 30));
        assert_eq!(config.level_multiplier, 2);
        assert_eq!(config.sync_mode, SyncMode::Authoritative);
        assert_eq!(config.countdown_interval, Duration::from_secs(1));
        assert!(config.metrics_port.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("SERVER_URL", "wss://worms.example:443/ws"),
            ("GRID_COLS", "64"),
            ("GRID_ROWS", "48"),
            ("LEVEL_MULTIPLIER", "3"),
            ("SYNC_MODE", "predictive"),
            ("BOMB_SPRITE_PATH", "assets/bomb.png"),
            ("METRICS_PORT", "9100"),
            ("COUNTDOWN_INTERVAL_MS", "250"),
        ]);

        assert_eq!(config.server_url, "wss://worms.example:443/ws");
        assert_eq!(config.grid(), Grid::new(64, 48));
        assert_eq!(config.level_multiplier, 3);
        assert_eq!(config.sync_mode, SyncMode::Predictive);
        assert_eq!(config.bomb_sprite_path, Some(PathBuf::from("assets/bomb.png")));
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.countdown_interval, Duration::from_millis(250));

        let settings = config.sync_settings();
        assert_eq!(settings.mode, SyncMode::Predictive);
        assert_eq!(settings.level_multiplier, 3);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("SERVER_URL", "http://nope"),
            ("GRID_COLS", "0"),
            ("GRID_ROWS", "tall"),
            ("LEVEL_MULTIPLIER", "0"),
            ("SYNC_MODE", "lockstep"),
            ("METRICS_PORT", "99999"),
            ("COUNTDOWN_INTERVAL_MS", "-5"),
        ]);

        let defaults = ClientConfig::default();
        assert_eq!(config.server_url, defaults.server_url);
        assert_eq!(config.grid(), defaults.grid());
        assert_eq!(config.level_multiplier, defaults.level_multiplier);
        assert_eq!(config.sync_mode, defaults.sync_mode);
        assert!(config.metrics_port.is_none());
        assert_eq!(config.countdown_interval, defaults.countdown_interval);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.level_multiplier = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.grid_cols = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default() {
        let config = ClientConfig::load_or_default();
        assert!(config.grid_cols > 0);
    }
}
