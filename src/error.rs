use serde::{Deserialize, Serialize};

/// Failure taxonomy surfaced inside scan results. None of these abort a scan:
/// parsing errors short-circuit to a policy verdict, ML failures degrade to a
/// neutral floor reading, and persistence failures are only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ParsingError,
    MlAdapterDegraded,
    PersistenceFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn parsing(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ParsingError,
            message: message.into(),
        }
    }
}
