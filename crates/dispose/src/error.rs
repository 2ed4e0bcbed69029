//! Error types for resource disposal
use thiserror::Error;

use crate::entry::ItemId;

/// Boxed error returned by a failing dispose action.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for disposal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while tracking or disposing resources.
///
/// `Configuration` and `DuplicateTrack` are caller mistakes and are returned
/// before any tracking state changes. `Disposal` and `DisposePanicked` come
/// from individual dispose actions; draining operations collect them per entry
/// instead of aborting.
#[derive(Error, Debug)]
pub enum Error {
    /// Tracking was requested with an unusable combination of options
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// The item is already tracked in the active context
    #[error("Item '{item}' ({item_id}) is already tracked in the active context")]
    DuplicateTrack {
        /// Type name of the tracked item
        item: &'static str,
        /// Identity of the tracked item
        item_id: ItemId,
    },

    /// A dispose action returned an error
    #[error("Dispose action for '{item}' failed: {source}")]
    Disposal {
        /// Type name of the disposed item
        item: &'static str,
        /// The underlying error
        #[source]
        source: BoxError,
    },

    /// A dispose action panicked
    #[error("Dispose action for '{item}' panicked: {message}")]
    DisposePanicked {
        /// Type name of the disposed item
        item: &'static str,
        /// The panic payload, if it was a string
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a disposal error
    pub fn disposal(item: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Disposal {
            item,
            source: source.into(),
        }
    }

    /// Check if this error came from running a dispose action
    #[must_use]
    pub fn is_disposal(&self) -> bool {
        matches!(self, Self::Disposal { .. } | Self::DisposePanicked { .. })
    }

    /// Get the type name of the item this error concerns (if any)
    #[must_use]
    pub fn item(&self) -> Option<&'static str> {
        match self {
            Self::Configuration { .. } => None,
            Self::DuplicateTrack { item, .. }
            | Self::Disposal { item, .. }
            | Self::DisposePanicked { item, .. } => Some(item),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposal_errors_are_classified() {
        let err = Error::disposal("Handle", "socket already closed");
        assert!(err.is_disposal());
        assert_eq!(err.item(), Some("Handle"));
        assert_eq!(
            err.to_string(),
            "Dispose action for 'Handle' failed: socket already closed"
        );
    }

    #[test]
    fn configuration_has_no_item() {
        let err = Error::configuration("missing dispose action");
        assert!(!err.is_disposal());
        assert_eq!(err.item(), None);
    }
}
