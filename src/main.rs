use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wormo_client::config::ClientConfig;
use wormo_client::game::bomb::BombSprite;
use wormo_client::game::constants::net;
use wormo_client::game::countdown::TokioCountdowns;
use wormo_client::game::grid::Direction;
use wormo_client::game::presenter::TracingPresenter;
use wormo_client::metrics::Metrics;
use wormo_client::net::session::{Session, SessionInputs};
use wormo_client::net::sync::SyncController;
use wormo_client::net::transport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Wormo client v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {} grid={}x{} mode={}",
        config.server_url, config.grid_cols, config.grid_rows, config.sync_mode
    );

    let metrics = Arc::new(Metrics::new());

    #[cfg(feature = "metrics_server")]
    if let Some(port) = config.metrics_port {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = wormo_client::metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let (countdowns, ticks) = TokioCountdowns::channel(config.countdown_interval);
    let controller = SyncController::new(config.sync_settings(), TracingPresenter, countdowns);

    let link = transport::connect(&config.server_url, net::INBOUND_QUEUE_CAPACITY).await?;

    // Directions typed on stdin, one per line
    let (dir_tx, directions) = mpsc::channel(net::INPUT_QUEUE_CAPACITY);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_direction(&line) {
                Some(dir) => {
                    if dir_tx.send(dir).await.is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown direction '{}'", line.trim()),
            }
        }
    });

    let sprite = config
        .bomb_sprite_path
        .clone()
        .map(|path| tokio::spawn(async move { BombSprite::load(path).await }));

    let mut session = Session::new(controller, link.transport, config.server_url.clone(), metrics);
    let inputs = SessionInputs {
        events: link.events,
        directions,
        ticks,
        sprite,
    };

    tokio::select! {
        result = session.run(inputs) => {
            if let Err(e) = result {
                error!("Session error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}

/// Accepts wire letters and arrow-key style words
fn parse_direction(line: &str) -> Option<Direction> {
    match line.trim().to_ascii_lowercase().as_str() {
        "u" | "up" | "w" => Some(Direction::Up),
        "d" | "down" | "s" => Some(Direction::Down),
        "l" | "left" | "a" => Some(Direction::Left),
        "r" | "right" => Some(Direction::Right),
        _ => None,
    }
}
