use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `OrreryError` and maps other errors to
/// convert to an `OrreryError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum OrreryError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    /// A behavior script failed to load, or failed while executing a hook.
    Script(String),
    /// Persisted state is malformed (invalid id, unknown type, bad document).
    Save(String),
    OrreryError(String),
}

impl From<io::Error> for OrreryError {
    fn from(error: io::Error) -> Self {
        OrreryError::IoError(error)
    }
}

impl From<serde_json::Error> for OrreryError {
    fn from(error: serde_json::Error) -> Self {
        OrreryError::JsonError(error)
    }
}

impl From<String> for OrreryError {
    fn from(error: String) -> Self {
        OrreryError::OrreryError(error)
    }
}

impl From<&str> for OrreryError {
    fn from(error: &str) -> Self {
        OrreryError::OrreryError(error.to_string())
    }
}

impl std::error::Error for OrreryError {}

impl Display for OrreryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {self:?}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_conversions() {
        let from_str: OrreryError = "oops".into();
        let from_string: OrreryError = String::from("oops").into();
        assert!(matches!(from_str, OrreryError::OrreryError(ref s) if s == "oops"));
        assert!(matches!(from_string, OrreryError::OrreryError(ref s) if s == "oops"));
    }

    #[test]
    fn io_error_is_wrapped() {
        let err: OrreryError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, OrreryError::IoError(_)));
    }

    #[test]
    fn display_includes_variant() {
        let err = OrreryError::Save("invalid object id 0".to_string());
        assert!(err.to_string().contains("invalid object id 0"));
    }
}
