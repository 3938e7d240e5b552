//! Client connections.
//!
//! - `Connection`: the record the hub registers, with its id and close signal
//! - `Lifecycle`: Connecting -> Authenticating -> Registered -> Streaming -> Closing -> Closed
//! - `Session`: the read loop that pumps payloads to the publisher and
//!   unregisters the connection when it ends

mod lifecycle;
mod session;
mod types;

pub use lifecycle::{ConnectionState, Lifecycle};
pub use session::Session;
pub use types::{CloseReason, Connection, ConnectionId, ConnectionIdGenerator};
