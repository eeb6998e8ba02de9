//! Error types for wasm-host.
//!
//! This module defines the error taxonomy using `thiserror`:
//! - [`RuntimeError`]: Errors returned by engine, store and context operations
//! - [`Trap`]: Conditions that halt an execution, such as fuel exhaustion

use thiserror::Error;

/// Errors returned by engine, store and context operations.
///
/// Every fallible operation returns one of these as a value. None of them
/// leave the store or its context half-initialized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A fuel operation was used on a store whose engine was built with
    /// `consume_fuel` disabled.
    #[error("fuel metering is disabled")]
    FuelMeteringDisabled,

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Allocation failed or a configured limit was reached.
    #[error("Resource exhausted ({resource}): {reason}")]
    ResourceExhausted {
        /// The resource that could not be allocated.
        resource: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// Execution was halted.
    #[error("Wasm trap: {0}")]
    Trap(#[from] Trap),

    /// The engine's feature gates rejected a module.
    #[error("Validation failed at offset {offset}: {reason}")]
    Validation {
        /// The validator's message.
        reason: String,
        /// Byte offset into the module binary.
        offset: usize,
    },

    /// A handle was resolved against a store that did not create it.
    #[error("handle does not belong to this store")]
    StoreMismatch,

    /// A handle refers to an object that has since been removed.
    #[error("handle refers to a removed object")]
    StaleHandle,

    /// A handle slot holds an object of a different type.
    #[error("handle does not refer to a `{expected}`")]
    HandleTypeMismatch {
        /// The type the handle was created for.
        expected: &'static str,
    },
}

/// Conditions that halt an execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    /// The fuel meter could not cover the cost of the next unit of work.
    #[error("all fuel consumed: {required_fuel} more required")]
    OutOfFuel {
        /// Cost of the unit of work that could not be paid for.
        required_fuel: u64,
    },

    /// A host callback or executor halted execution.
    #[error("{message}")]
    Host {
        /// Description of the trap.
        message: String,
    },
}

impl Trap {
    /// Create a new `Host` trap.
    pub fn host(message: impl Into<String>) -> Self {
        Self::Host {
            message: message.into(),
        }
    }

    /// Returns `true` if this trap was caused by fuel exhaustion.
    pub fn is_out_of_fuel(&self) -> bool {
        matches!(self, Self::OutOfFuel { .. })
    }
}

impl RuntimeError {
    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a new `ResourceExhausted` error.
    pub fn resource_exhausted(resource: &'static str, reason: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource,
            reason: reason.into(),
        }
    }

    /// Create a new `Validation` error.
    pub fn validation(reason: impl Into<String>, offset: usize) -> Self {
        Self::Validation {
            reason: reason.into(),
            offset,
        }
    }

    /// Returns `true` if this error stems from the store's configuration
    /// rather than from its state.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::FuelMeteringDisabled | Self::InvalidConfig { .. })
    }

    /// Returns `true` if this error is a trap.
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trap(_))
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted { .. } | Self::Trap(Trap::OutOfFuel { .. })
        )
    }

    /// Returns the trap if this error is one.
    pub fn as_trap(&self) -> Option<&Trap> {
        match self {
            Self::Trap(trap) => Some(trap),
            _ => None,
        }
    }
}
