//! Store Error Types

use thiserror::Error;

/// Name rejected before it reaches storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name must be {min} or more characters long")]
    TooShort { min: usize, actual: usize },

    #[error("Name must be less than {limit} characters long", limit = .max + 1)]
    TooLong { max: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// Name failed validation; reported to the client in-band
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Name already exists; reported to the client in-band
    #[error("That name has already been taken")]
    Duplicate { name: String },

    /// Backend failed or was closed; never reported to the client
    #[error("Store unavailable during {operation}: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable_with_source(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Unavailable {
            operation,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn closed(operation: &'static str) -> Self {
        Self::unavailable(operation, "store is closed")
    }

    /// Whether the error is a rejection the client should see
    pub fn is_rejection(&self) -> bool {
        matches!(self, StoreError::Validation(_) | StoreError::Duplicate { .. })
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "validation",
            StoreError::Duplicate { .. } => "duplicate",
            StoreError::Unavailable { .. } => "unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        let short = StoreError::from(ValidationError::TooShort { min: 3, actual: 2 });
        assert_eq!(short.to_string(), "Name must be 3 or more characters long");
        assert!(short.is_rejection());

        let long = StoreError::from(ValidationError::TooLong {
            max: 128,
            actual: 129,
        });
        assert_eq!(long.to_string(), "Name must be less than 129 characters long");

        let dup = StoreError::Duplicate {
            name: "testOrg".into(),
        };
        assert_eq!(dup.to_string(), "That name has already been taken");
        assert!(dup.is_rejection());
    }

    #[test]
    fn test_unavailable_is_not_a_rejection() {
        let err = StoreError::closed("create");
        assert!(!err.is_rejection());
        assert_eq!(err.category(), "unavailable");
        assert!(err.to_string().contains("create"));
    }
}
