use super::{types::Config, ConfigError};
use crate::index::SchemaName;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Database URL is set
/// - Pool has at least one connection
/// - Schema override, if any, is a lowercase SQL identifier
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.database.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "database.url must be set".to_string(),
        ));
    }

    if config.database.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be at least 1".to_string(),
        ));
    }

    if let Some(schema) = &config.database.schema {
        schema
            .parse::<SchemaName>()
            .map_err(|e| ConfigError::ValidationError(format!("database.schema: {}", e)))?;
    }

    Ok(())
}
