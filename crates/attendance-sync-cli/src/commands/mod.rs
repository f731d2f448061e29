pub mod cache;
pub mod clear;
pub mod config;
pub mod record;
pub mod status;
pub mod sync;
pub mod watch;
