pub mod error;
pub mod presence;
pub mod state;

pub use error::ChatError;
pub use state::{ChatConfig, ChatState, NewMessage};
