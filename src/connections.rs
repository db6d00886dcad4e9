//! Connection Registry
//! driver_id -> live socket sender map with targeted send and broadcast.
//! Send failures evict the entry; broadcast iterates a snapshot so evictions
//! never race the iteration.

use crate::models::{ClientMessage, GpsLog, ServerMessage};
use crate::store::FleetDb;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, UnboundedSender<ServerMessage>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver's socket, replacing any prior connection.
    pub fn connect(&self, driver_id: &str, sender: UnboundedSender<ServerMessage>) {
        let replaced = self
            .connections
            .write()
            .insert(driver_id.to_string(), sender)
            .is_some();
        if replaced {
            debug!("WebSocket reconnected: driver {driver_id} (previous socket replaced)");
        } else {
            info!("🔌 WebSocket connected: driver {driver_id}");
        }
    }

    pub fn disconnect(&self, driver_id: &str) {
        if self.connections.write().remove(driver_id).is_some() {
            info!("🔌 WebSocket disconnected: driver {driver_id}");
        }
    }

    /// Remove the entry only if it still points at this socket. A reader that
    /// lost its slot to a reconnect must not evict the replacement.
    pub fn disconnect_socket(&self, driver_id: &str, sender: &UnboundedSender<ServerMessage>) {
        let mut connections = self.connections.write();
        if connections
            .get(driver_id)
            .map(|current| current.same_channel(sender))
            .unwrap_or(false)
        {
            connections.remove(driver_id);
            info!("🔌 WebSocket disconnected: driver {driver_id}");
        }
    }

    pub fn is_connected(&self, driver_id: &str) -> bool {
        self.connections.read().contains_key(driver_id)
    }

    pub fn active_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Targeted send. Absent drivers drop the message; a dead socket is
    /// evicted immediately. Returns whether the message was handed off.
    pub fn send(&self, driver_id: &str, message: ServerMessage) -> bool {
        let sender = self.connections.read().get(driver_id).cloned();
        match sender {
            Some(sender) => {
                if sender.send(message).is_ok() {
                    true
                } else {
                    warn!("send to driver {driver_id} failed, evicting connection");
                    self.disconnect(driver_id);
                    false
                }
            }
            None => {
                debug!("driver {driver_id} not connected, dropping message");
                false
            }
        }
    }

    /// Send to every live connection. Iterates over a snapshot and defers
    /// evictions until after the loop.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let snapshot: Vec<(String, UnboundedSender<ServerMessage>)> = self
            .connections
            .read()
            .iter()
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (driver_id, sender) in snapshot {
            if sender.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(driver_id);
            }
        }

        for driver_id in dead {
            warn!("broadcast to driver {driver_id} failed, evicting connection");
            self.disconnect(&driver_id);
        }
        delivered
    }
}

/// Route one inbound frame. Unknown types are logged and ignored (None).
/// Location updates also land in the store as telemetry; store failure does
/// not fail the ack.
pub fn route_client_message(
    db: &FleetDb,
    driver_id: &str,
    raw: &str,
) -> Option<ServerMessage> {
    let message: ClientMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(_) => {
            warn!("unknown message type from driver {driver_id}, ignoring");
            return None;
        }
    };

    match message {
        ClientMessage::Ping => Some(ServerMessage::Pong {
            timestamp: Utc::now().to_rfc3339(),
        }),
        ClientMessage::LocationUpdate {
            latitude,
            longitude,
        } => {
            if let Err(e) = db.update_driver_location(driver_id, latitude, longitude) {
                warn!("location update persist failed: {e:#}");
            }
            if let Err(e) = db.insert_gps_log(&GpsLog {
                id: Uuid::new_v4().to_string(),
                driver_id: driver_id.to_string(),
                latitude,
                longitude,
                recorded_at: Utc::now(),
            }) {
                warn!("gps log persist failed: {e:#}");
            }
            Some(ServerMessage::LocationReceived {
                status: "ok".to_string(),
            })
        }
        ClientMessage::DeliveryStatus { package_id, status } => {
            info!(
                "📦 Delivery status from driver {driver_id}: package {package_id} -> {status}"
            );
            Some(ServerMessage::StatusReceived { package_id })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::sample_driver;
    use tokio::sync::mpsc;

    #[test]
    fn reconnect_replaces_prior_socket() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        registry.connect("d1", tx1);
        registry.connect("d1", tx2);
        assert_eq!(registry.active_count(), 1);

        assert!(registry.send(
            "d1",
            ServerMessage::Pong {
                timestamp: "t".to_string()
            }
        ));
        // Only the second socket receives.
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn send_to_absent_driver_drops() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send(
            "ghost",
            ServerMessage::Pong {
                timestamp: "t".to_string()
            }
        ));
    }

    #[test]
    fn dead_socket_evicted_on_send() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        registry.connect("d1", tx);

        assert!(!registry.send(
            "d1",
            ServerMessage::Pong {
                timestamp: "t".to_string()
            }
        ));
        assert!(!registry.is_connected("d1"));
    }

    #[test]
    fn broadcast_skips_and_evicts_dead_connections() {
        let registry = ConnectionRegistry::new();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        drop(rx_dead);

        registry.connect("live", tx_live);
        registry.connect("dead", tx_dead);

        let delivered = registry.broadcast(&ServerMessage::Pong {
            timestamp: "t".to_string(),
        });
        assert_eq!(delivered, 1);
        assert!(rx_live.try_recv().is_ok());
        assert_eq!(registry.active_count(), 1);
        assert!(!registry.is_connected("dead"));
    }

    #[test]
    fn routing_answers_ping_and_acks() {
        let db = FleetDb::in_memory().unwrap();
        db.create_driver(&sample_driver("d1", "d1@fleet.test")).unwrap();

        let pong = route_client_message(&db, "d1", r#"{"type":"ping"}"#);
        assert!(matches!(pong, Some(ServerMessage::Pong { .. })));

        let ack = route_client_message(
            &db,
            "d1",
            r#"{"type":"location_update","latitude":19.1,"longitude":72.9}"#,
        );
        assert!(matches!(ack, Some(ServerMessage::LocationReceived { .. })));

        // Location persisted onto the driver record.
        let driver = db.get_driver("d1").unwrap().unwrap();
        assert_eq!(driver.current_latitude, Some(19.1));

        let ack = route_client_message(
            &db,
            "d1",
            r#"{"type":"delivery_status","package_id":"p9","status":"delivered"}"#,
        );
        match ack {
            Some(ServerMessage::StatusReceived { package_id }) => assert_eq!(package_id, "p9"),
            other => panic!("unexpected reply: {other:?}"),
        }

        assert!(route_client_message(&db, "d1", r#"{"type":"selfie"}"#).is_none());
    }
}
