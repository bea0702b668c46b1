//! Background loops: the kernel heartbeat and per-agent maintenance.
//!
//! Everything here is cooperative and fire-and-forget: loops suspend on
//! their interval, never hold the registry exclusively, and report only
//! through the notice sink.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use mantle_shared::{Agent, Notice, NoticeSender};

use crate::registry::AgentRegistry;

/// Spawn the heartbeat task: every `interval`, poll each agent's status and
/// emit one `agent.heartbeat` notice per agent.
pub fn spawn_heartbeat_task(
    registry: Arc<AgentRegistry>,
    interval: std::time::Duration,
    notices: NoticeSender,
    shutdown: Arc<Notify>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        info!(interval_secs = interval.as_secs(), "heartbeat task started");

        loop {
            tokio::select! {
                () = shutdown.notified() => {
                    info!("heartbeat task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    for agent in registry.agents() {
                        let descriptor = agent.descriptor();
                        let status = agent.status().await;
                        debug!(agent_id = %descriptor.id, status = %status, "heartbeat");
                        notices.emit(Notice::new(
                            "agent.heartbeat",
                            serde_json::json!({
                                "agent_id": descriptor.id,
                                "status": status.to_string(),
                            }),
                            "kernel.heartbeat",
                        ));
                    }
                }
            }
        }
    });
}

/// Spawn one cooperative maintenance loop per agent that asks for one.
/// Returns how many loops were spawned.
pub fn spawn_maintenance_loops(
    registry: &Arc<AgentRegistry>,
    notices: NoticeSender,
    shutdown: Arc<Notify>,
) -> usize {
    let mut spawned = 0;
    for agent in registry.agents() {
        let Some(interval) = agent.maintenance_interval() else {
            continue;
        };
        let agent = agent.clone();
        let notices = notices.clone();
        let shutdown = shutdown.clone();
        let agent_id = agent.descriptor().id;
        spawned += 1;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so maintenance only
            // runs after a full interval of real operation.
            ticker.tick().await;
            info!(agent_id = %agent_id, interval_secs = interval.as_secs(), "maintenance loop started");

            loop {
                tokio::select! {
                    () = shutdown.notified() => {
                        info!(agent_id = %agent_id, "maintenance loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match agent.on_maintenance().await {
                            Ok(Some(notice)) => notices.emit(notice),
                            Ok(None) => {}
                            Err(e) => {
                                warn!(agent_id = %agent_id, error = %e, "maintenance tick failed");
                            }
                        }
                    }
                }
            }
        });
    }
    spawned
}
