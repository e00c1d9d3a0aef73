//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket connection:
//! configuration, the session registry, the pipeline coordinator, and the
//! relay metrics that the health endpoints report.

use crate::config::AppConfig;
use crate::pipeline::PipelineCoordinator;
use crate::session::SessionRegistry;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Metrics handle shared between connections, pipelines, and handlers.
pub type SharedMetrics = Arc<RwLock<CallMetrics>>;

/// Counters for the relay and pipeline surface.
///
/// ## Thread Safety:
/// Mutated behind a RwLock from connection actors and pipeline tasks;
/// health handlers take cheap read snapshots.
#[derive(Debug, Default, Clone)]
pub struct CallMetrics {
    /// WebSocket connections accepted since startup
    pub connections_opened: u64,

    /// Currently open WebSocket connections
    pub active_connections: u32,

    /// Snapshots dispatched to the transcription pipeline
    pub pipelines_started: u64,

    /// Pipelines that ended in a broadcast error event
    pub pipelines_failed: u64,

    /// Transcription events broadcast to calls
    pub transcriptions_broadcast: u64,

    /// Snapshots dropped by the gate, the hallucination filter, or
    /// duplicate suppression
    pub chunks_suppressed: u64,
}

impl CallMetrics {
    pub fn record_connection_opened(&mut self) {
        self.connections_opened += 1;
        self.active_connections += 1;
    }

    /// Guards against underflow so a double-close can never wrap the gauge.
    pub fn record_connection_closed(&mut self) {
        if self.active_connections > 0 {
            self.active_connections -= 1;
        }
    }
}

/// The shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub metrics: SharedMetrics,
    pub registry: Arc<SessionRegistry>,
    pub pipeline: Arc<PipelineCoordinator>,
    start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: Arc<SessionRegistry>,
        pipeline: Arc<PipelineCoordinator>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            config,
            metrics,
            registry,
            pipeline,
            start_time: Instant::now(),
        }
    }

    /// Record a newly accepted WebSocket connection.
    pub fn connection_opened(&self) {
        self.metrics.write().unwrap().record_connection_opened();
    }

    /// Record a closed WebSocket connection.
    pub fn connection_closed(&self) {
        self.metrics.write().unwrap().record_connection_closed();
    }

    /// Consistent copy of the counters for the health surface.
    pub fn metrics_snapshot(&self) -> CallMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let mut metrics = CallMetrics::default();

        metrics.record_connection_opened();
        metrics.record_connection_opened();
        metrics.record_connection_closed();

        assert_eq!(metrics.connections_opened, 2);
        assert_eq!(metrics.active_connections, 1);
    }

    #[test]
    fn test_active_connections_never_underflow() {
        let mut metrics = CallMetrics::default();

        metrics.record_connection_closed();
        assert_eq!(metrics.active_connections, 0);
    }
}
