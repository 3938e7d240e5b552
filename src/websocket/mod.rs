mod handler;
mod listener;

pub use handler::ws_handler;
pub use listener::{serve_connection, ListenerOutcome};
