//! Room Registry
//!
//! Owns every live room. Each room pairs a [`Session`] with the outbound
//! channels of its seated connections, behind its own lock. Lock order is
//! always registry, then room; never take the registry lock while holding
//! a room.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::game::error::GameError;
use crate::game::session::{ConnectionId, Player, Session};
use crate::network::protocol::{GameSnapshot, RoomId, RoomSummary, ServerMessage, SnapshotKind};

/// Length of a room id in hex characters.
pub const ROOM_ID_LEN: usize = 8;

/// Shared handle to one room.
pub type RoomHandle = Arc<RwLock<Room>>;

/// Generate a short room id from a fresh v4 uuid.
fn new_room_id() -> RoomId {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(ROOM_ID_LEN);
    id
}

// =============================================================================
// ROOM
// =============================================================================

/// A live room: game state plus the seated connections' outbound channels.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    session: Session,
    senders: BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>,
}

impl Room {
    /// Wrap a session.
    pub fn new(id: RoomId, session: Session) -> Self {
        Self {
            id,
            session,
            senders: BTreeMap::new(),
        }
    }

    /// Room id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Game state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Game state, mutably.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Register a connection's outbound channel.
    pub fn attach(&mut self, id: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.senders.insert(id, sender);
    }

    /// Forget a connection's outbound channel.
    pub fn detach(&mut self, id: &ConnectionId) {
        self.senders.remove(id);
    }

    /// Number of attached channels.
    pub fn member_count(&self) -> usize {
        self.senders.len()
    }

    /// Send to every attached connection without waiting.
    ///
    /// Returns how many channels accepted the message.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        for (id, sender) in &self.senders {
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Dropped broadcast to {} in room {}: {}", id, self.id, e),
            }
        }
        delivered
    }

    /// Remove a seated connection and tell whoever remains.
    ///
    /// Returns the departed player, or `None` if `id` held no seat.
    pub fn depart(&mut self, id: &ConnectionId) -> Option<Player> {
        let player = self.session.remove_player(id)?;
        self.detach(id);

        info!("{} left room {}", player.name, self.id);
        if !self.session.is_empty() {
            let snapshot = GameSnapshot::departure(&self.session, &player);
            self.broadcast(&ServerMessage::GameState(snapshot));
        }
        Some(player)
    }

    /// Directory entry for this room.
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.session.room_name().to_string(),
            creator: self.session.creator_name().to_string(),
            players: self.session.players().len(),
            has_password: self.session.has_password(),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Debug)]
struct RoomEntry {
    /// Insertion sequence, for listing order.
    seq: u64,
    /// Lowercased room name, for the uniqueness check.
    name_key: String,
    room: RoomHandle,
}

/// All live rooms, keyed by id.
#[derive(Debug)]
pub struct Registry {
    rooms: RwLock<BTreeMap<RoomId, RoomEntry>>,
    next_seq: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Open a room with its creator seated and attached.
    pub async fn create(
        &self,
        room_name: &str,
        creator_id: ConnectionId,
        creator_name: &str,
        password: Option<String>,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(RoomId, RoomHandle), GameError> {
        let name_key = room_name.to_lowercase();

        let mut rooms = self.rooms.write().await;
        if rooms.values().any(|entry| entry.name_key == name_key) {
            return Err(GameError::DuplicateRoomName);
        }

        let id = loop {
            let candidate = new_room_id();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut room = Room::new(
            id.clone(),
            Session::new(room_name, creator_id, creator_name, password),
        );
        room.attach(creator_id, sender);
        let handle = Arc::new(RwLock::new(room));

        rooms.insert(
            id.clone(),
            RoomEntry {
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                name_key,
                room: Arc::clone(&handle),
            },
        );

        info!("Room {} ({:?}) created by {}", id, room_name, creator_name);
        Ok((id, handle))
    }

    /// Look up a room.
    pub async fn get(&self, id: &str) -> Result<RoomHandle, GameError> {
        let rooms = self.rooms.read().await;
        rooms
            .get(id)
            .map(|entry| Arc::clone(&entry.room))
            .ok_or(GameError::GameNotFound)
    }

    /// Seat `id` in a room, attach its channel and broadcast the new state.
    ///
    /// Holds the registry lock throughout, so the room cannot be closed
    /// between lookup and seating.
    pub async fn join(
        &self,
        room_id: &str,
        id: ConnectionId,
        name: &str,
        password: Option<&str>,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Player, GameError> {
        let rooms = self.rooms.read().await;
        let entry = rooms.get(room_id).ok_or(GameError::GameNotFound)?;
        let mut room = entry.room.write().await;

        let player = room.session_mut().join(id, name, password)?.clone();
        room.attach(id, sender);

        let snapshot = GameSnapshot::capture(room.session(), SnapshotKind::Joined);
        room.broadcast(&ServerMessage::GameState(snapshot));
        Ok(player)
    }

    /// Remove a room unconditionally.
    pub async fn remove(&self, id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        rooms.remove(id).is_some()
    }

    /// Remove a room if nobody is seated in it.
    ///
    /// Emptiness is re-checked under the registry lock, so a join that won
    /// the race keeps the room alive.
    pub async fn remove_if_empty(&self, id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let empty = match rooms.get(id) {
            Some(entry) => entry.room.read().await.session().is_empty(),
            None => return false,
        };
        if empty {
            rooms.remove(id);
            info!("Room {} closed", id);
        }
        empty
    }

    /// Directory of live rooms in creation order.
    pub async fn list(&self) -> Vec<RoomSummary> {
        let rooms = self.rooms.read().await;
        let mut entries: Vec<&RoomEntry> = rooms.values().collect();
        entries.sort_by_key(|entry| entry.seq);

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            summaries.push(entry.room.read().await.summary());
        }
        summaries
    }

    /// Every room in which `member` holds a seat.
    pub async fn rooms_with_member(&self, member: &ConnectionId) -> Vec<(RoomId, RoomHandle)> {
        let rooms = self.rooms.read().await;
        let mut found = Vec::new();
        for (id, entry) in rooms.iter() {
            if entry.room.read().await.session().is_seated(member) {
                found.push((id.clone(), Arc::clone(&entry.room)));
            }
        }
        found
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
