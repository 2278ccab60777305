//! Adapters for the domain ports: order stores and HTTP gateway clients.

pub mod http;
pub mod in_memory;
#[cfg(feature = "storage-postgres")]
pub mod postgres;
