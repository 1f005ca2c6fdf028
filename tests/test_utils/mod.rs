#![allow(dead_code, unused_imports)]

pub mod collectors;

pub mod fixtures;

pub use collectors::{LineCollector, UdpCollector};
pub use fixtures::{agent_config, append, log_dir, prime};
