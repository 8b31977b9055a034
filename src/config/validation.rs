//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, point bounds ordered)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function over the config

use crate::config::schema::DiscoveryConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    ZeroDuration(&'static str),
    PointBoundsInverted { min: u32, max: u32 },
    ZeroStep(&'static str),
    RatioOrderInverted { start: f64, max: f64, field: &'static str },
    FractionOutOfRange { field: &'static str, value: f64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::ZeroDuration(field) => {
                write!(f, "{} must be greater than zero", field)
            }
            ValidationError::PointBoundsInverted { min, max } => {
                write!(f, "min_points {} exceeds max_points {}", min, max)
            }
            ValidationError::ZeroStep(field) => {
                write!(f, "{} must be at least 1 point", field)
            }
            ValidationError::RatioOrderInverted { start, max, field } => {
                write!(f, "{} degradation start {} must be below its max {}", field, start, max)
            }
            ValidationError::FractionOutOfRange { field, value } => {
                write!(f, "{} must be within [0, 1], got {}", field, value)
            }
        }
    }
}

/// Validate a full config, collecting every problem found.
pub fn validate_config(config: &DiscoveryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let conn = &config.connection;
    if conn.connect_timeout_ms == 0 {
        errors.push(ValidationError::ZeroDuration("connection.connect_timeout_ms"));
    }
    if conn.operation_timeout_ms == 0 {
        errors.push(ValidationError::ZeroDuration("connection.operation_timeout_ms"));
    }
    if conn.backoff_base_ms == 0 {
        errors.push(ValidationError::ZeroDuration("connection.backoff_base_ms"));
    }

    let strategy = &config.strategy;
    if strategy.update_interval_ms == 0 {
        errors.push(ValidationError::ZeroDuration("strategy.update_interval_ms"));
    }
    if strategy.min_points > strategy.max_points {
        errors.push(ValidationError::PointBoundsInverted {
            min: strategy.min_points,
            max: strategy.max_points,
        });
    }
    if strategy.up_step == 0 {
        errors.push(ValidationError::ZeroStep("strategy.up_step"));
    }
    if strategy.down_step == 0 {
        errors.push(ValidationError::ZeroStep("strategy.down_step"));
    }
    if strategy.degrade_latency_ratio >= strategy.max_latency_ratio {
        errors.push(ValidationError::RatioOrderInverted {
            start: strategy.degrade_latency_ratio,
            max: strategy.max_latency_ratio,
            field: "strategy latency ratio",
        });
    }
    if strategy.degrade_error_rate >= strategy.max_error_rate {
        errors.push(ValidationError::RatioOrderInverted {
            start: strategy.degrade_error_rate,
            max: strategy.max_error_rate,
            field: "strategy error rate",
        });
    }

    let quarantine = &strategy.quarantine;
    if !(0.0..=1.0).contains(&quarantine.max_fraction) {
        errors.push(ValidationError::FractionOutOfRange {
            field: "strategy.quarantine.max_fraction",
            value: quarantine.max_fraction,
        });
    }
    if !(0.0..=1.0).contains(&quarantine.score_threshold) {
        errors.push(ValidationError::FractionOutOfRange {
            field: "strategy.quarantine.score_threshold",
            value: quarantine.score_threshold,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
