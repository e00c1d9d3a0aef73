//! # Result Broadcaster
//!
//! Formats pipeline outcomes as wire events and fans them out through the
//! session registry. Transcriptions go to the whole room, sender included:
//! the speaker sees their own recognized and translated text as a caption.

use crate::events::ServerEvent;
use crate::session::SessionRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fan-out of typed pipeline events to a call.
pub struct ResultBroadcaster {
    registry: Arc<SessionRegistry>,
}

impl ResultBroadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver a recognized-and-translated utterance to every participant.
    pub fn broadcast_transcription(
        &self,
        call_id: &str,
        source: &str,
        translated: &str,
        sender: &str,
    ) -> usize {
        let event = ServerEvent::Transcription {
            source: source.to_string(),
            translated: translated.to_string(),
            sender: sender.to_string(),
        };

        let delivered = self.registry.broadcast(call_id, &event, None);
        debug!(
            "Broadcast transcription to call {} ({} recipients): {}",
            call_id, delivered, source
        );
        delivered
    }

    /// Surface a processing failure to every participant of the call.
    pub fn broadcast_error(&self, call_id: &str, message: &str, code: Option<&str>) -> usize {
        let event = ServerEvent::Error {
            message: message.to_string(),
            code: code.map(str::to_string),
        };

        let delivered = self.registry.broadcast(call_id, &event, None);
        warn!("Broadcast error to call {}: {}", call_id, message);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OutboundFrame;
    use crate::testutil::FrameSink;

    #[actix_web::test]
    async fn test_transcription_includes_sender() {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = ResultBroadcaster::new(registry.clone());

        let (a, a_frames) = FrameSink::start();
        let (b, b_frames) = FrameSink::start();
        registry.join("abc", "en", a);
        registry.join("abc", "mr", b);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();
        b_frames.lock().unwrap().clear();

        let delivered = broadcaster.broadcast_transcription("abc", "hello", "नमस्ते", "en");
        assert_eq!(delivered, 2);
        FrameSink::settle().await;

        let expected = OutboundFrame::Event(ServerEvent::Transcription {
            source: "hello".to_string(),
            translated: "नमस्ते".to_string(),
            sender: "en".to_string(),
        });
        assert_eq!(a_frames.lock().unwrap().as_slice(), &[expected.clone()]);
        assert_eq!(b_frames.lock().unwrap().as_slice(), &[expected]);
    }

    #[actix_web::test]
    async fn test_error_reaches_whole_room() {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = ResultBroadcaster::new(registry.clone());

        let (a, a_frames) = FrameSink::start();
        registry.join("abc", "en", a);
        FrameSink::settle().await;
        a_frames.lock().unwrap().clear();

        broadcaster.broadcast_error("abc", "Transcription failed: decode", Some("STT_ERROR"));
        FrameSink::settle().await;

        let frames = a_frames.lock().unwrap();
        match &frames[0] {
            OutboundFrame::Event(ServerEvent::Error { message, code }) => {
                assert_eq!(message, "Transcription failed: decode");
                assert_eq!(code.as_deref(), Some("STT_ERROR"));
            }
            other => panic!("Unexpected frame: {:?}", other),
        }
    }
}
