pub mod analysis;
pub mod cleanup;
pub mod config;
pub mod connectors;
pub mod identity;
pub mod output;
pub mod snapshot;
