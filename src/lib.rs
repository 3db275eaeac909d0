pub mod command;
pub mod config;
pub mod controller;
pub mod evm_client;
pub mod identity;
pub mod notify;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod units;
pub mod workflow;
