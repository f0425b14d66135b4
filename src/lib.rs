pub mod bench;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod monitor;
pub mod protocol;
pub mod server;
pub mod state;
pub mod storage;
pub mod supervisor;
pub mod timeout;
pub mod util;
pub mod validate;
pub mod worker;
