//! # Session Registry
//!
//! Tracks which connections belong to which call and fans payloads out to
//! them. This is the one structure mutated by every connection and every
//! pipeline concurrently, so all access goes through the lock held inside;
//! nothing outside this module touches the membership map directly.

use crate::events::{OutboundFrame, ServerEvent};
use actix::Recipient;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Registry of active calls and their participants.
///
/// ## Delivery discipline:
/// A failed send to one recipient is logged and skipped; it never aborts
/// delivery to the rest of the room and never removes the participant.
/// Removal only happens through an explicit `leave` when the transport
/// itself disconnects.
pub struct SessionRegistry {
    /// call_id -> (participant_id -> connection handle)
    rooms: RwLock<HashMap<String, HashMap<String, Recipient<OutboundFrame>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a participant to a call, creating the session if absent.
    ///
    /// The new participant receives a unicast status event carrying the
    /// current room size.
    pub fn join(&self, call_id: &str, participant_id: &str, connection: Recipient<OutboundFrame>) {
        let room_size = {
            let mut rooms = self.rooms.write().unwrap();
            let room = rooms.entry(call_id.to_string()).or_default();
            room.insert(participant_id.to_string(), connection.clone());
            room.len()
        };

        info!("Participant {} joined call {}", participant_id, call_id);

        let status = ServerEvent::Status {
            status: format!("Connected to call {}", call_id),
            details: Some(serde_json::json!({
                "user_id": participant_id,
                "room_size": room_size,
            })),
        };

        if connection.try_send(OutboundFrame::Event(status)).is_err() {
            warn!(
                "Failed to send join status to participant {} in call {}",
                participant_id, call_id
            );
        }
    }

    /// Remove a participant; the session is deleted the instant it empties.
    pub fn leave(&self, call_id: &str, participant_id: &str) {
        let mut rooms = self.rooms.write().unwrap();

        if let Some(room) = rooms.get_mut(call_id) {
            if room.remove(participant_id).is_some() {
                info!("Participant {} left call {}", participant_id, call_id);
            }

            if room.is_empty() {
                rooms.remove(call_id);
                info!("Call {} closed (empty)", call_id);
            }
        }
    }

    /// Relay raw audio bytes to every participant except the sender.
    pub fn relay_bytes(&self, call_id: &str, payload: &[u8], sender_id: &str) {
        let rooms = self.rooms.read().unwrap();

        let Some(room) = rooms.get(call_id) else {
            return;
        };

        for (participant_id, connection) in room.iter() {
            if participant_id == sender_id {
                continue;
            }

            if connection
                .try_send(OutboundFrame::Audio(payload.to_vec()))
                .is_err()
            {
                warn!(
                    "Failed to relay audio to participant {} in call {}",
                    participant_id, call_id
                );
            }
        }
    }

    /// Broadcast a structured event to the call.
    ///
    /// Returns the number of participants the event was delivered to.
    pub fn broadcast(
        &self,
        call_id: &str,
        event: &ServerEvent,
        exclude_sender: Option<&str>,
    ) -> usize {
        let rooms = self.rooms.read().unwrap();

        let Some(room) = rooms.get(call_id) else {
            debug!("Attempted to broadcast to non-existent call: {}", call_id);
            return 0;
        };

        let mut delivered = 0;
        for (participant_id, connection) in room.iter() {
            if exclude_sender == Some(participant_id.as_str()) {
                continue;
            }

            match connection.try_send(OutboundFrame::Event(event.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    warn!(
                        "Failed to broadcast to participant {} in call {}",
                        participant_id, call_id
                    );
                }
            }
        }

        delivered
    }

    /// Number of participants in a call (0 if the call does not exist).
    pub fn room_size(&self, call_id: &str) -> usize {
        self.rooms
            .read()
            .unwrap()
            .get(call_id)
            .map_or(0, HashMap::len)
    }

    /// Identifiers of every active call.
    pub fn active_calls(&self) -> Vec<String> {
        self.rooms.read().unwrap().keys().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
