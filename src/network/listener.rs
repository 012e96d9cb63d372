// src/network/listener.rs

use crate::error::LinkError;
use crate::events::model::LogLevel;
use crate::network::connection::Connection;
use crate::network::events::emit_network_event;
use crate::network::relay::RelayEngine;
use crate::network::topology::Direction;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

fn log_network_event(level: LogLevel, action: &str, addr: Option<String>, detail: Option<String>) {
    emit_network_event("listener", level, action, addr, detail);
}

/// Bind the mesh listener on all interfaces. Port 0 picks a free port.
pub async fn bind_listener(port: u16) -> Result<TcpListener, LinkError> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    log_network_event(
        LogLevel::Info,
        "listener_bind",
        listener.local_addr().ok().map(|a| a.to_string()),
        None,
    );
    Ok(listener)
}

/// Accept loop: every accepted socket becomes an inbound neighbor.
/// Accept errors are logged and the loop keeps going.
pub fn start_listener(listener: TcpListener, engine: RelayEngine) -> JoinHandle<()> {
    let max_frame = engine.settings.max_frame;
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    log_network_event(
                        LogLevel::Debug,
                        "incoming_connection",
                        Some(peer_addr.to_string()),
                        None,
                    );
                    match Connection::from_stream(stream, max_frame) {
                        Ok(connection) => {
                            engine.attach(connection, Direction::Inbound).await;
                        }
                        Err(e) => log_network_event(
                            LogLevel::Warn,
                            "accept_setup_failed",
                            Some(peer_addr.to_string()),
                            Some(e.to_string()),
                        ),
                    }
                }
                Err(e) => {
                    log_network_event(LogLevel::Error, "accept_failed", None, Some(e.to_string()));
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }
    })
}
