//! Domain layer: order entities, the status state machine and the ports the
//! application layer drives.

pub mod gateway;
pub mod order;
pub mod payment_type;
pub mod ports;
pub mod status;
