//! Error type shared by the stores, the service layer and the HTTP surface.

/// Every failure the dashboard can report to a caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Requested task or member does not exist
    #[error("{0}")]
    NotFound(String),

    /// Record with the same identifier already exists
    #[error("{0}")]
    Conflict(String),

    /// Request body failed validation
    #[error("{0}")]
    InvalidInput(String),

    /// Feature needs a backend or mailer that is not configured
    #[error("{0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success answer from the Graph API
    #[error("Graph API {status}: {body}")]
    Graph { status: u16, body: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("workbook error: {0}")]
    Workbook(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// HTTP status code this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::InvalidInput(_) | Self::Unavailable(_) => 400,
            _ => 500,
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Workbook(err.to_string())
    }
}

impl From<calamine::XlsxError> for Error {
    fn from(err: calamine::XlsxError) -> Self {
        Self::Workbook(err.to_string())
    }
}
