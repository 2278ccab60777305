//! Inbound side: payment callback events and the sources that deliver them.

pub mod consumer;
pub mod events;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod replay;
