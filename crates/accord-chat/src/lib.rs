pub mod connection;
pub mod dispatcher;
pub mod log;

pub use dispatcher::{Dispatcher, Subscription};
pub use log::ChatLog;
