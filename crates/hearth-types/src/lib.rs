pub mod api;
pub mod models;

/// Room used when a request names none, and when a reaction target has vanished.
pub const DEFAULT_ROOM: &str = "public";
