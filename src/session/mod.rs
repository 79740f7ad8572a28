//! Session state
//!
//! One [`Session`] exists per client. It is owned by a [`SessionStore`];
//! everything else reads snapshots or writes through the field-level writer
//! handles handed out when the store is created.

mod buffer;
mod store;

pub use buffer::CollectMode;
pub use store::{ControlWriter, LinkWriter, Session, SessionStore, SessionWriters, TelemetryWriter};
