use std::{fmt, sync::Arc};

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;
use vigil_model::ScanId;

use crate::websocket::connection::Connection;
use crate::websocket::messages::ServerFrame;

/// Registry of live connections and scan-room membership.
///
/// Rooms are keyed by scan id; a connection may sit in any number of
/// rooms. Fan-out uses non-blocking sends so one saturated client never
/// holds up the rest of a room.
#[derive(Clone)]
pub struct ConnectionManager {
    /// Active WebSocket connections mapped by connection ID
    connections: Arc<DashMap<Uuid, Arc<Connection>>>,
    /// Scan rooms - maps scan ID to list of connection IDs
    rooms: Arc<DashMap<ScanId, Vec<Uuid>>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection_count", &self.connections.len())
            .field("room_count", &self.rooms.len())
            .finish()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            rooms: Arc::new(DashMap::new()),
        }
    }

    /// Register a new connection
    pub fn add_connection(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id, connection);
    }

    /// Remove a connection and clean up room membership
    pub fn remove_connection(&self, conn_id: Uuid) {
        self.connections.remove(&conn_id);

        for mut room in self.rooms.iter_mut() {
            room.value_mut().retain(|id| id != &conn_id);
        }

        // Clean up empty rooms
        self.rooms.retain(|_, members| !members.is_empty());
    }

    /// Add a connection to a scan's room
    pub fn join_room(&self, scan_id: ScanId, conn_id: Uuid) {
        let mut members = self.rooms.entry(scan_id).or_default();
        if !members.contains(&conn_id) {
            members.push(conn_id);
        }
        debug!(%scan_id, %conn_id, "joined scan room");
    }

    /// Remove a connection from a scan's room
    pub fn leave_room(&self, scan_id: ScanId, conn_id: Uuid) {
        if let Some(mut members) = self.rooms.get_mut(&scan_id) {
            members.value_mut().retain(|id| id != &conn_id);
        }

        // Clean up empty room
        if let Some(members) = self.rooms.get(&scan_id)
            && members.is_empty()
        {
            drop(members);
            self.rooms.remove(&scan_id);
        }
    }

    /// Get all connections in a scan's room
    pub fn room_connections(&self, scan_id: ScanId) -> Vec<Arc<Connection>> {
        self.rooms
            .get(&scan_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|conn_id| {
                        self.connections.get(conn_id).map(|c| c.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_connection(&self, conn_id: &Uuid) -> Option<Arc<Connection>> {
        self.connections.get(conn_id).map(|c| c.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Emit a frame to every connection in a scan's room.
    pub fn broadcast_to_room(&self, scan_id: ScanId, frame: &ServerFrame) {
        for conn in self.room_connections(scan_id) {
            if let Err(err) = conn.try_send(frame.clone()) {
                tracing::warn!(
                    conn_id = %conn.id,
                    error = %err,
                    "dropping room frame"
                );
            }
        }
    }

    /// Emit a frame to every connection.
    pub fn broadcast_all(&self, frame: &ServerFrame) {
        for conn in self.connections.iter() {
            if let Err(err) = conn.try_send(frame.clone()) {
                tracing::warn!(
                    conn_id = %conn.id,
                    error = %err,
                    "dropping broadcast frame"
                );
            }
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connected() -> (Arc<Connection>, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(Connection::new(tx)), rx)
    }

    #[tokio::test]
    async fn room_broadcast_reaches_only_members() {
        let manager = ConnectionManager::new();
        let (member, mut member_rx) = connected();
        let (outsider, mut outsider_rx) = connected();
        manager.add_connection(Arc::clone(&member));
        manager.add_connection(Arc::clone(&outsider));

        let scan_id = ScanId::new();
        manager.join_room(scan_id, member.id);

        let frame =
            ServerFrame::new("scan:progress", serde_json::json!(42));
        manager.broadcast_to_room(scan_id, &frame);

        assert_eq!(member_rx.recv().await.unwrap().event, "scan:progress");
        assert!(outsider_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_all_reaches_everyone() {
        let manager = ConnectionManager::new();
        let (a, mut a_rx) = connected();
        let (b, mut b_rx) = connected();
        manager.add_connection(a);
        manager.add_connection(b);

        manager.broadcast_all(&ServerFrame::new(
            "scan:update",
            serde_json::json!({}),
        ));

        assert!(a_rx.recv().await.is_some());
        assert!(b_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn leaving_a_room_stops_room_frames() {
        let manager = ConnectionManager::new();
        let (conn, mut rx) = connected();
        manager.add_connection(Arc::clone(&conn));

        let scan_id = ScanId::new();
        manager.join_room(scan_id, conn.id);
        manager.leave_room(scan_id, conn.id);

        manager.broadcast_to_room(
            scan_id,
            &ServerFrame::new("scan:progress", serde_json::json!(1)),
        );
        assert!(rx.try_recv().is_err());
        assert!(manager.room_connections(scan_id).is_empty());
    }

    #[tokio::test]
    async fn disconnect_cleans_up_all_rooms() {
        let manager = ConnectionManager::new();
        let (conn, _rx) = connected();
        manager.add_connection(Arc::clone(&conn));

        let first = ScanId::new();
        let second = ScanId::new();
        manager.join_room(first, conn.id);
        manager.join_room(second, conn.id);

        manager.remove_connection(conn.id);
        assert!(manager.room_connections(first).is_empty());
        assert!(manager.room_connections(second).is_empty());
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn joining_twice_does_not_duplicate_delivery() {
        let manager = ConnectionManager::new();
        let (conn, mut rx) = connected();
        manager.add_connection(Arc::clone(&conn));

        let scan_id = ScanId::new();
        manager.join_room(scan_id, conn.id);
        manager.join_room(scan_id, conn.id);

        manager.broadcast_to_room(
            scan_id,
            &ServerFrame::new("scan:progress", serde_json::json!(1)),
        );
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }
}
