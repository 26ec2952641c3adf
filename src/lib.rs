pub mod config;
pub mod domain;
pub mod metrics;
pub mod storage;
pub mod utils;
