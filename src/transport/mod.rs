//! Transport layer for the persistent channel
//!
//! Connectors produce byte streams; framing lives in `teleop_shared::codec`.

mod tcp;
pub mod traits;

pub use tcp::TcpConnector;
pub use traits::{TransportConnector, TransportStream};
