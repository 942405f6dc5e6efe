//! RoboRace Game Server
//!
//! Authoritative server for the robot race. Every room runs its own
//! deterministic simulation; the binary only wires up logging, config and
//! the WebSocket listener.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roborace::{
    network::{GameServer, ServerConfig},
    HAND_SIZE, MAX_PLAYERS, REGISTER_COUNT, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ServerConfig::from_env();

    info!("RoboRace Server v{}", VERSION);
    info!("Registers: {}, hand: {}, seats: {}", REGISTER_COUNT, HAND_SIZE, MAX_PLAYERS);
    info!(
        "Timers: programming {:?}, power down {:?}, respawn {:?}, damage prevention {:?}",
        config.room.programming_timeout,
        config.room.power_down_timeout,
        config.room.respawn_timeout,
        config.room.damage_prevention_timeout,
    );
    info!("Default board: {}", config.default_board);

    let server = Arc::new(GameServer::new(config));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await.context("game server failed")?;

    info!("Server stopped with {} rooms open", server.room_count().await);
    Ok(())
}
