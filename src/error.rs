use thiserror::Error;

/// The primary error type produced by the dashboard.
///
/// Load and registration errors are fatal at startup. `InvalidInputValue`
/// and `NoSuchInput` are recoverable: the offending event is rejected and
/// the session is left as it was.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DashboardError {
    #[error("failed to load dataset: {0}")]
    DataLoad(String),
    #[error("view \"{0}\" is already registered")]
    DuplicateView(String),
    #[error("input \"{0}\" is already declared")]
    DuplicateInput(String),
    #[error("view \"{view}\" depends on undeclared input \"{input}\"")]
    UnknownInput { view: String, input: String },
    #[error("no input named \"{0}\"")]
    NoSuchInput(String),
    #[error("invalid value {value} for input \"{input}\": {reason}")]
    InvalidInputValue {
        input: String,
        value: String,
        reason: String,
    },
    #[error("no view named \"{0}\"")]
    UnknownView(String),
    #[error("no column named \"{0}\"")]
    UnknownColumn(String),
}

impl DashboardError {
    pub(crate) fn data_load(message: impl Into<String>) -> Self {
        DashboardError::DataLoad(message.into())
    }
}

/// Failure of a single view's render function.
///
/// Never propagated out of the engine; it becomes that view's artifact.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        RenderError {
            message: message.into(),
        }
    }
}

impl From<DashboardError> for RenderError {
    fn from(err: DashboardError) -> Self {
        RenderError::new(err.to_string())
    }
}
