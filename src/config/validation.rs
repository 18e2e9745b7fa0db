//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the bind address and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - The server builder is the only caller besides the file loader

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No bind address was provided.
    #[error("no bind address provided")]
    EmptyAddress,

    /// The bind address is not in `host:port` form.
    #[error("invalid bind address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// `max_connections` must allow at least one connection.
    #[error("max_connections must be greater than zero")]
    ZeroConnections,

    /// No request handler was supplied to the builder.
    #[error("no request handler provided")]
    MissingHandler,
}

/// Validate a server configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let address = config.address.trim();
    if address.is_empty() {
        errors.push(ValidationError::EmptyAddress);
    } else if let Err(reason) = check_host_port(address) {
        errors.push(ValidationError::InvalidAddress {
            address: config.address.clone(),
            reason,
        });
    }

    if config.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Shape check only; host names are resolved when the listener binds.
/// An empty host (`:8080`) means every interface.
fn check_host_port(address: &str) -> Result<(), String> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| "missing port".to_string())?;

    port.parse::<u16>()
        .map_err(|e| format!("invalid port {:?}: {}", port, e))?;

    if host.starts_with('[') != host.ends_with(']') {
        return Err(format!("unbalanced brackets in host {:?}", host));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(format!("whitespace in host {:?}", host));
    }
    Ok(())
}
