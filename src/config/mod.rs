// * Startup configuration: env-backed settings plus fixed constants.

pub mod constants;
pub mod settings;

pub use settings::{
    AgentConfig, ConfigError, DashboardConfig, EndpointConfig, SelectorConfig,
};
