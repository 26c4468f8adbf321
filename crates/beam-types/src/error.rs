use thiserror::Error;

#[derive(Error, Debug)]
pub enum BeamError {
    #[error("Shape mismatch for '{name}': expected {expected} entries, got {found}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Coordinate '{0}' already exists; use update() to overwrite it")]
    DuplicateCoordinate(String),

    #[error("Coordinate '{0}' is not defined on this ensemble")]
    MissingCoordinate(String),

    #[error("Incompatible ensembles: {0}")]
    IncompatibleEnsemble(String),

    #[error("Invalid value '{value}' for {option}; expected one of {allowed}")]
    InvalidOption {
        option: String,
        value: String,
        allowed: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No slice set available: {0}")]
    UnslicedState(String),

    #[error("Invalid permutation: {0}")]
    InvalidPermutation(String),

    #[error("Bucket {bucket_id} holds {found} macro-particles, expected {expected}")]
    UnequalBuckets {
        bucket_id: i32,
        expected: usize,
        found: usize,
    },

    #[error("Cell ids are not sorted at position {position}")]
    UnsortedCellIds { position: usize },

    #[error("Physics constraint violated: {0}")]
    PhysicsViolation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BeamError {
    /// Shorthand for the closed-set option errors raised by parsers.
    pub fn invalid_option(option: &str, value: &str, allowed: &[&str]) -> Self {
        BeamError::InvalidOption {
            option: option.to_string(),
            value: value.to_string(),
            allowed: format!("{{{}}}", allowed.join(", ")),
        }
    }
}

pub type BeamResult<T> = Result<T, BeamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = BeamError::ShapeMismatch {
            name: "xp".into(),
            expected: 10,
            found: 9,
        };
        assert_eq!(
            err.to_string(),
            "Shape mismatch for 'xp': expected 10 entries, got 9"
        );
    }

    #[test]
    fn test_invalid_option_lists_allowed_values() {
        let err = BeamError::invalid_option("include_unsliced", "sometimes", &["always", "never"]);
        let msg = err.to_string();
        assert!(msg.contains("'sometimes'"));
        assert!(msg.contains("{always, never}"));
    }
}
