//! Test support: an in-process stand-in for a connection actor that
//! records every frame it is handed.

use crate::events::OutboundFrame;
use actix::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type RecordedFrames = Arc<Mutex<Vec<OutboundFrame>>>;

/// Actor that collects outbound frames instead of writing to a socket.
pub struct FrameSink {
    frames: RecordedFrames,
}

#[derive(Message)]
#[rtype(result = "()")]
struct Shutdown;

impl FrameSink {
    /// Start a sink and return its connection handle plus the frame log.
    pub fn start() -> (Recipient<OutboundFrame>, RecordedFrames) {
        let frames: RecordedFrames = Arc::new(Mutex::new(Vec::new()));
        let addr = FrameSink {
            frames: frames.clone(),
        }
        .start();
        (addr.recipient(), frames)
    }

    /// Start a sink whose actor has already stopped, so every send fails.
    pub async fn start_stopped() -> (Recipient<OutboundFrame>, RecordedFrames) {
        let frames: RecordedFrames = Arc::new(Mutex::new(Vec::new()));
        let addr = FrameSink {
            frames: frames.clone(),
        }
        .start();
        addr.send(Shutdown).await.ok();
        Self::settle().await;
        (addr.recipient(), frames)
    }

    /// Let in-flight mailbox deliveries drain.
    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

impl Actor for FrameSink {
    type Context = Context<Self>;
}

impl Handler<OutboundFrame> for FrameSink {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, _ctx: &mut Self::Context) {
        self.frames.lock().unwrap().push(msg);
    }
}

impl Handler<Shutdown> for FrameSink {
    type Result = ();

    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) {
        ctx.stop();
    }
}
