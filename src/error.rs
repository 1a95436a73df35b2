use serde::Serialize;
use thiserror::Error;

/// User-friendly error presentation for the wizard UI.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── File / CSV ────────────────────────────────────────────────────────────
    #[error("File is not valid UTF-8")]
    NotUtf8,

    #[error("Invalid CSV: {0}")]
    CsvInvalid(String),

    // ── Parsing ───────────────────────────────────────────────────────────────
    #[error("Parse failed: {0}")]
    ParseFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    // ── Upload ────────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Backend error ({status}): {message}")]
    BackendError { status: u16, message: String },

    #[error("Import job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts the error into a user-friendly presentation suitable for UI display.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── File / CSV ────────────────────────────────────────────────────
            AppError::NotUtf8 => ErrorPresentation {
                title: "Invalid File Encoding".into(),
                message: "The file must be UTF-8 encoded. Please re-save your file with UTF-8 encoding.".into(),
                action: Some("Convert file to UTF-8".into()),
            },

            AppError::CsvInvalid(msg) => ErrorPresentation {
                title: "Invalid CSV".into(),
                message: format!("The CSV file has a formatting problem: {}", msg),
                action: Some("Fix the CSV file and select it again".into()),
            },

            // ── Parsing ───────────────────────────────────────────────────────
            AppError::ParseFailed(msg) => ErrorPresentation {
                title: "Parse Failed".into(),
                message: format!("Could not parse the file: {}", msg),
                action: Some("Select a different file".into()),
            },

            AppError::Cancelled => ErrorPresentation {
                title: "Cancelled".into(),
                message: "The operation was cancelled.".into(),
                action: None,
            },

            // ── Upload ────────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the server. Please check your network connection.".into(),
                action: Some("Check network and retry".into()),
            },

            AppError::BackendError { status, message } => ErrorPresentation {
                title: "Server Error".into(),
                message: format!("The server rejected the request ({}): {}", status, message),
                action: Some("Review the error and try again".into()),
            },

            AppError::JobFailed { job_id: _, message } => ErrorPresentation {
                title: "Import Failed".into(),
                message: message.clone(),
                action: Some("Retry the import from the validation step".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
