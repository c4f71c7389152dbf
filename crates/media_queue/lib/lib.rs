pub mod build_info;
pub mod cli;
pub mod config;
pub mod live_feed;
pub mod logging;
pub mod queue;
pub mod server;
pub mod source;
pub mod state;
