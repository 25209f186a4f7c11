use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// A configuration parameter is out of its valid range.
    #[error("invalid configuration: {param} must be {requirement}, got {value}")]
    InvalidConfiguration {
        param: &'static str,
        requirement: &'static str,
        value: String,
    },
    /// A value does not have the shape the caller promised.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
}

impl Error {
    pub(crate) fn invalid_config<V: ToString>(
        param: &'static str,
        requirement: &'static str,
        value: V,
    ) -> Self {
        Error::InvalidConfiguration {
            param,
            requirement,
            value: value.to_string(),
        }
    }
}
