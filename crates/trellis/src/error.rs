//! Error types for the model bridge.

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// An error reported by a [`DataProvider`](crate::model::DataProvider)
/// implementation.
///
/// The bridge treats provider failures as opaque: on read paths they are
/// logged once and replaced by a safe default, on mutation paths they abort
/// the operation. Concrete providers wrap whatever their backing store
/// raises (a foreign-runtime exception, an I/O error, a protocol failure)
/// into the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    /// Create a provider error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message supplied by the provider.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ProviderError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ProviderError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_owned(),
        }
    }
}

/// Errors that can occur in the model bridge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A provider call failed on a mutation path (`set_data`, `sort`).
    ///
    /// The cache is left untouched when this is returned.
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    /// A structural operation addressed a window outside the cached extent.
    #[error("{axis} window {position}+{count} exceeds extent {len}")]
    OutOfRange {
        /// The axis the operation addressed.
        axis: crate::model::Axis,
        /// First position of the window.
        position: usize,
        /// Number of rows/columns in the window.
        count: usize,
        /// The cached extent the window was validated against.
        len: usize,
    },
}
