pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod workflow;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, RequestSeedInfo, SeedResult, VerificationResult};
pub use workflow::{DecisionCommand, DecisionService, DEFAULT_MAX_ATTEMPTS};
