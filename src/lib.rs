//! Power meter relay library
//!
//! Polls an electricity meter over Modbus, decodes the vendor register maps into
//! decimal readings and relays them to a remote collector over an authenticated,
//! encrypted UDP protocol that also keeps the local clock in sync.

pub mod config;
pub mod metering;
#[cfg(feature = "modbus")]
pub mod modbus;
pub mod models;
pub mod network;
pub mod poller;
pub mod telemetry;

#[cfg(test)]
mod mocks;

// Re-export common types for easier access
pub use config::Config;
pub use metering::PowerMeter;
pub use models::{Decimal, Reading};
pub use poller::PollManager;
pub use telemetry::TelemetryCodec;
