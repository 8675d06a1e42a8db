pub mod agent_link;
pub mod crypto;
pub mod database;
pub mod log_broker;
pub mod memory;
pub mod metrics;

pub use agent_link::AgentLinkRegistry;
pub use crypto::AesGcmCipher;
pub use database::DatabaseManager;
pub use log_broker::{LogBroker, LogEvent, LogSubscription};
