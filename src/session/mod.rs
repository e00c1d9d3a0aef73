//! # Session Module
//!
//! Call membership tracking and payload fan-out. A session (room) is the
//! set of connections sharing one call identifier; it exists exactly as
//! long as it has at least one participant.

pub mod registry;

pub use registry::SessionRegistry;
