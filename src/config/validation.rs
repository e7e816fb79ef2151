//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports valid, limits non-zero)
//! - Detect conflicting listener addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("upstream host must not be empty")]
    EmptyUpstreamHost,

    #[error("upstream port must not be zero")]
    ZeroUpstreamPort,

    #[error("max_message_bytes must not be zero")]
    ZeroMessageLimit,

    #[error("invalid {name} bind address: {address}")]
    InvalidBindAddress { name: &'static str, address: String },

    #[error("listener and health bind addresses must differ")]
    ConflictingBindAddresses,
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstream.host.is_empty() {
        errors.push(ValidationError::EmptyUpstreamHost);
    }
    if config.upstream.port == 0 {
        errors.push(ValidationError::ZeroUpstreamPort);
    }
    if config.limits.max_message_bytes == 0 {
        errors.push(ValidationError::ZeroMessageLimit);
    }

    let listener = parse_addr("listener", &config.listener.bind_address, &mut errors);
    let health = parse_addr("health", &config.health.bind_address, &mut errors);

    if let (Some(listener), Some(health)) = (listener, health) {
        if config.health.enabled && listener == health {
            errors.push(ValidationError::ConflictingBindAddresses);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn parse_addr(
    name: &'static str,
    address: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<SocketAddr> {
    match address.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::InvalidBindAddress {
                name,
                address: address.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn rejects_empty_upstream_host_and_zero_port() {
        let mut config = GatewayConfig::default();
        config.upstream.host = String::new();
        config.upstream.port = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn rejects_shared_bind_address() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "127.0.0.1:9000".into();
        config.health.bind_address = "127.0.0.1:9000".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::ConflictingBindAddresses
        ));
    }

    #[test]
    fn rejects_unparseable_bind_address() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::InvalidBindAddress { name: "listener", .. }
        ));
    }
}
