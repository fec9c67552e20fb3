//! Demo application wired around the stats engine.

pub mod handlers;
pub mod load_generator;
pub mod logging;
pub mod server;
pub mod stream;
