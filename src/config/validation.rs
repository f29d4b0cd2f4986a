//! Configuration validation.
//!
//! Serde handles the syntax; this module checks value ranges and formats.
//! Every problem is reported, not just the first one.

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::auth::token;
use crate::config::schema::ApiConfig;
use crate::lifecycle::controller::MAX_DRAIN_TIMEOUT;

const ENVIRONMENTS: &[&str] = &["development", "staging", "production"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Ten years.
pub const MAX_SEED_TTL_HOURS: u64 = 10 * 365 * 24;

const PASSWORD_COSTS: std::ops::RangeInclusive<u32> = 4..=31;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ApiConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            "must be a socket address such as 0.0.0.0:4000",
        ));
    }
    if !ENVIRONMENTS.contains(&config.listener.environment.as_str()) {
        errors.push(ValidationError::new(
            "listener.environment",
            "must be one of development, staging, production",
        ));
    }

    let limiter = &config.limiter;
    if !(limiter.requests_per_second.is_finite() && limiter.requests_per_second > 0.0) {
        errors.push(ValidationError::new(
            "limiter.requests_per_second",
            "must be greater than zero",
        ));
    }
    if limiter.burst == 0 {
        errors.push(ValidationError::new("limiter.burst", "must be at least 1"));
    }
    if limiter.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "limiter.sweep_interval_secs",
            "must be at least 1",
        ));
    }
    if limiter.idle_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "limiter.idle_timeout_secs",
            "must be at least 1",
        ));
    }

    if config.shutdown.drain_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "shutdown.drain_timeout_secs",
            "must be at least 1",
        ));
    } else if config.shutdown.drain_timeout() > MAX_DRAIN_TIMEOUT {
        errors.push(ValidationError::new(
            "shutdown.drain_timeout_secs",
            format!("must be at most {}", MAX_DRAIN_TIMEOUT.as_secs()),
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be at least 1"));
    }

    for origin in &config.cors.trusted_origins {
        if HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::new(
                "cors.trusted_origins",
                format!("{origin:?} is not a valid origin"),
            ));
        }
    }

    if !LOG_FORMATS.contains(&config.observability.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be pretty or json",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if !PASSWORD_COSTS.contains(&config.auth.password_cost) {
        errors.push(ValidationError::new(
            "auth.password_cost",
            "must be between 4 and 31",
        ));
    }
    if config.auth.purge_interval_secs == 0 {
        errors.push(ValidationError::new(
            "auth.purge_interval_secs",
            "must be at least 1",
        ));
    }

    for (i, seed) in config.auth.seed.iter().enumerate() {
        if !token::validate_plaintext(&seed.token) {
            errors.push(ValidationError::new(
                format!("auth.seed[{i}].token"),
                "must be 26 base-32 characters",
            ));
        }
        if seed.ttl_hours == 0 {
            errors.push(ValidationError::new(
                format!("auth.seed[{i}].ttl_hours"),
                "must be at least 1",
            ));
        } else if seed.ttl_hours > MAX_SEED_TTL_HOURS {
            errors.push(ValidationError::new(
                format!("auth.seed[{i}].ttl_hours"),
                format!("must be at most {MAX_SEED_TTL_HOURS}"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
