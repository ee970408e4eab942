use std::error::Error as StdError;

use thiserror::Error;

/// Errors returned by [`Registry`](crate::Registry) operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The active lock type could not produce a lock for a new entry.
    #[error("failed to create `{lock_type}` lock for {type_name}: {reason}")]
    LockCreation {
        type_name: &'static str,
        lock_type: &'static str,
        reason: String,
    },

    /// The singleton's constructor failed. The type is left uncreated.
    #[error("construction of {type_name} failed: {source}")]
    Construction {
        type_name: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// Waiting for the type's lock was forcibly terminated.
    #[error("acquiring the lock of {type_name} was aborted")]
    LockAborted { type_name: &'static str },

    #[error("type not found in registry: {type_name}")]
    TypeNotFound { type_name: &'static str },

    #[error("type mismatch in registry for type: {type_name}")]
    TypeMismatch { type_name: &'static str },
}

impl RegistryError {
    /// The type the failed operation was about.
    pub fn type_name(&self) -> &'static str {
        match self {
            RegistryError::LockCreation { type_name, .. }
            | RegistryError::Construction { type_name, .. }
            | RegistryError::LockAborted { type_name }
            | RegistryError::TypeNotFound { type_name }
            | RegistryError::TypeMismatch { type_name } => type_name,
        }
    }

    /// The constructor's own error, if this is a [`RegistryError::Construction`]
    /// whose source is an `E`.
    pub fn construction_source<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            RegistryError::Construction { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Whether the error came from an aborted lock, either directly or through a
    /// nested construction that was aborted.
    pub fn is_lock_aborted(&self) -> bool {
        match self {
            RegistryError::LockAborted { .. } => true,
            RegistryError::Construction { .. } => self
                .construction_source::<RegistryError>()
                .is_some_and(RegistryError::is_lock_aborted),
            _ => false,
        }
    }
}
