pub mod hub;
pub mod stream;

pub use hub::{Hub, Subscription};
