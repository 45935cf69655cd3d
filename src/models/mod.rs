//! Data models and structures for the network speed tester

pub mod config;
pub mod packet;
pub mod run;

// Re-export main model types
pub use config::Config;
pub use packet::ProbePacket;
pub use run::{MeasurementRun, ResultRecord, SaveResponse};
