pub mod error;
pub mod messages;
pub mod middleware;
pub mod requests;
pub mod verify;

pub use verify::{AppState, AppStateInner};
