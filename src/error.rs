//! Error types for Kairos.
//!
//! All errors in Kairos are strongly typed using thiserror.
//! Errors fall into three kinds: contract violations (raised synchronously
//! at the offending call), configuration errors (detected while building a
//! simulation, before any plan executes), and runtime errors (raised from
//! inside a plan action or event handler, aborting the whole run).

use thiserror::Error;

use crate::entity::EntityId;
use crate::time::Time;

/// Precondition failures raised synchronously at the call that violates them.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Cannot schedule at {scheduled}: current simulation time is {current}")]
    PastTime {
        scheduled: Time,
        current: Time,
    },

    #[error("Simulation time must be finite, got {value}")]
    InvalidTime {
        value: f64,
    },

    #[error("A labeler with id '{labeler_id}' is already registered for event '{event}'")]
    DuplicateLabeler {
        event: &'static str,
        labeler_id: &'static str,
    },

    #[error("No labeler with id '{labeler_id}' is registered for event '{event}'")]
    UnknownLabeler {
        event: &'static str,
        labeler_id: &'static str,
    },

    #[error("No data manager of type '{type_name}' is registered")]
    UnknownDataManager {
        type_name: &'static str,
    },

    #[error("Data manager '{type_name}' is already borrowed (re-entrant access)")]
    DataManagerInUse {
        type_name: &'static str,
    },

    #[error("No plugin data of type '{type_name}' was contributed")]
    UnknownPluginData {
        type_name: &'static str,
    },

    #[error("Property at index {index} is immutable and already assigned")]
    ImmutableProperty {
        index: usize,
    },

    #[error("Assignment times were not tracked for this property")]
    TimeTrackingOff,

    #[error("No partition with id {id} exists")]
    UnknownPartition {
        id: u64,
    },

    #[error("Entity {id} is not alive")]
    EntityNotAlive {
        id: EntityId,
    },

    #[error("Invalid RNG state: {reason}")]
    InvalidRngState {
        reason: String,
    },
}

/// Configuration errors detected while assembling a simulation.
///
/// Any of these aborts construction before any plan executes; no partial
/// simulation is ever left runnable.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Plugin id cannot be empty")]
    EmptyPluginId,

    #[error("Duplicate plugin id '{id}'")]
    DuplicatePluginId {
        id: String,
    },

    #[error("Plugin '{plugin}' depends on '{dependency}', which was not added")]
    MissingDependency {
        plugin: String,
        dependency: String,
    },

    #[error("Plugin dependency cycle involving: {ids:?}")]
    DependencyCycle {
        ids: Vec<String>,
    },

    #[error("A data manager of type '{type_name}' is already registered")]
    DuplicateDataManager {
        type_name: &'static str,
    },

    #[error("Plugin data payload contributed twice: {payload}")]
    DuplicatePluginData {
        payload: String,
    },
}

/// Top-level error type for Kairos.
///
/// This enum encompasses all possible errors that can occur when building
/// or running a simulation. Errors raised from inside plan actions or event
/// handlers propagate out of the run loop unchanged; the kernel has no
/// internal fallback or retry policy.
#[derive(Debug, Error)]
pub enum KairosError {
    #[error("Contract violation: {0}")]
    Contract(#[from] ContractError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("{0}")]
    User(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl KairosError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wraps a domain error raised by client code inside a plan action or
    /// event handler.
    #[must_use]
    pub fn user(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::User(Box::new(err))
    }

    /// Returns true if this is a contract violation.
    #[must_use]
    pub const fn is_contract(&self) -> bool {
        matches!(self, Self::Contract(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is a wrapped domain error.
    #[must_use]
    pub const fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for Kairos operations.
pub type KairosResult<T> = Result<T, KairosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_error_past_time_message() {
        let err = ContractError::PastTime {
            scheduled: Time::new(1.0).unwrap(),
            current: Time::new(2.0).unwrap(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("Cannot schedule at 1"));
        assert!(msg.contains("current simulation time is 2"));
    }

    #[test]
    fn contract_error_duplicate_labeler_message() {
        let err = ContractError::DuplicateLabeler {
            event: "InfectionStatusChanged",
            labeler_id: "by-region",
        };
        let msg = format!("{err}");
        assert!(msg.contains("by-region"));
        assert!(msg.contains("InfectionStatusChanged"));
    }

    #[test]
    fn configuration_error_cycle_message() {
        let err = ConfigurationError::DependencyCycle {
            ids: vec!["a".to_string(), "b".to_string()],
        };
        let msg = format!("{err}");
        assert!(msg.contains('a'));
        assert!(msg.contains('b'));
    }

    #[test]
    fn kairos_error_from_contract() {
        let err: KairosError = ContractError::TimeTrackingOff.into();
        assert!(err.is_contract());
        assert!(!err.is_configuration());
    }

    #[test]
    fn kairos_error_from_configuration() {
        let err: KairosError = ConfigurationError::EmptyPluginId.into();
        assert!(err.is_configuration());
        assert!(!err.is_internal());
    }

    #[test]
    fn kairos_error_internal() {
        let err = KairosError::internal("unexpected state");
        assert!(err.is_internal());
        let msg = format!("{err}");
        assert!(msg.contains("unexpected state"));
    }

    #[test]
    fn kairos_error_user_preserves_source() {
        #[derive(Debug, Error)]
        #[error("domain failure")]
        struct DomainError;

        let err = KairosError::user(DomainError);
        assert!(err.is_user());
        assert!(format!("{err}").contains("domain failure"));
    }
}
