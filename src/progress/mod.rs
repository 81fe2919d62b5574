pub mod catalog;
pub mod challenge;
pub mod clock;
pub mod engine;
pub mod events;
pub mod hearts;
pub mod rewards;
pub mod session;
pub mod streak;
pub mod unlock;

pub use engine::{ProgressEngine, ProgressError};
