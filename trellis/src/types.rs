use crate::codec::ConversionError;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, TrellisError>;

/// Errors raised while compiling includes, projections or converting values.
///
/// Every variant is raised synchronously from pure computation over in-memory
/// metadata, so none of them can succeed on retry without a changed input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrellisError {
    /// Rejected include path. Also raised by `CaseBuilder::end_case`, with
    /// the alias in `path`.
    #[error("invalid input '{path}': {reason}")]
    Validation { path: String, reason: String },

    /// Include path would revisit a segment already on the active descent
    #[error("include path '{path}' would revisit '{segment}'")]
    Cycle { path: String, segment: String },

    /// Unresolvable navigation, unresolved foreign key, missing junction
    /// metadata or an entity without the required declaration
    #[error("configuration error for '{subject}': {message}")]
    Configuration { subject: String, message: String },

    /// Value/type mismatch in the codec
    #[error("cannot convert property '{property}' (column '{column}'): {source}")]
    Conversion {
        property: String,
        column: String,
        #[source]
        source: ConversionError,
    },
}

impl TrellisError {
    /// Create a validation error for an include path
    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a cycle error
    pub fn cycle(path: impl Into<String>, segment: impl Into<String>) -> Self {
        Self::Cycle {
            path: path.into(),
            segment: segment.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Wrap a codec failure with the property and column it happened on
    pub fn conversion(
        property: impl Into<String>,
        column: impl Into<String>,
        source: ConversionError,
    ) -> Self {
        Self::Conversion {
            property: property.into(),
            column: column.into(),
            source,
        }
    }

    /// Re-target a configuration error at the include path that triggered it.
    /// Other variants already carry their own subject and pass through.
    pub(crate) fn at_path(self, path: &str) -> Self {
        match self {
            Self::Configuration { subject, message } if subject != path => Self::Configuration {
                subject: path.to_string(),
                message: format!("{} ({})", message, subject),
            },
            other => other,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { path, reason } => {
                format!("Input '{}' was rejected: {}", path, reason)
            }
            Self::Cycle { path, segment } => {
                format!(
                    "Include path '{}' loops back through '{}'. Remove the repeated navigation.",
                    path, segment
                )
            }
            Self::Configuration { subject, message } => {
                format!(
                    "Entity metadata for '{}' is incomplete: {}. Please check your model definitions.",
                    subject, message
                )
            }
            Self::Conversion {
                property,
                column,
                source,
            } => {
                format!(
                    "Value of '{}' (column '{}') could not be converted: {}",
                    property, column, source
                )
            }
        }
    }
}

impl From<TrellisError> for sea_orm::DbErr {
    fn from(err: TrellisError) -> Self {
        sea_orm::DbErr::Custom(err.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_path_retargets_configuration_errors() {
        let err = TrellisError::configuration("Order", "no navigation 'Customr'");
        match err.at_path("Customr.Orders") {
            TrellisError::Configuration { subject, message } => {
                assert_eq!(subject, "Customr.Orders");
                assert!(message.contains("no navigation 'Customr'"));
                assert!(message.contains("Order"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = TrellisError::cycle("A.B.A", "A");
        assert_eq!(err.clone().at_path("x"), err);
    }

    #[test]
    fn test_errors_convert_into_db_err() {
        let err: sea_orm::DbErr = TrellisError::validation("a..b", "contains '..'").into();
        assert!(err.to_string().contains("Input 'a..b' was rejected"));

        let err: sea_orm::DbErr = TrellisError::cycle("Orders.Customer.Orders", "Orders").into();
        assert!(err.to_string().contains("Remove the repeated navigation"));
    }
}
