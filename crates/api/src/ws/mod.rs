pub mod handler;
pub mod heartbeat;
pub mod manager;

pub use heartbeat::{Heartbeat, HeartbeatState};
pub use manager::WsManager;
