use thiserror::Error;

/// Errors raised while turning an uploaded file into a [`crate::table::TabularModel`].
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("CSV file is empty")]
    Empty,

    #[error("quoted field starting on line {line} is never closed")]
    UnterminatedQuote { line: usize },

    #[error("column {index} has a blank name")]
    BlankColumn { index: usize },

    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("row {row} has {found} values but the header has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("malformed CSV: {0}")]
    Malformed(String),
}

/// Errors raised while drawing or encoding a chart.
#[derive(Error, Debug)]
pub enum ChartError {
    #[error("chart drawing failed: {0}")]
    Draw(String),

    #[error("chart encoding failed: {0}")]
    Encode(String),
}

/// Errors raised while laying out or serializing a report document.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("cannot compose a report from a table with no columns")]
    EmptyModel,

    #[error("{role} image could not be decoded: {reason}")]
    Image { role: &'static str, reason: String },

    #[error("PDF serialization failed: {0}")]
    Pdf(String),
}

/// Errors raised by the history store.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored timestamp '{0}' is not valid")]
    Timestamp(String),

    #[error("'{0}' is not allowed to view activity of other users")]
    NotAdmin(String),
}

/// Credential and permission failures.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("not logged in")]
    NotAuthenticated,

    #[error("admin role required")]
    Forbidden,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Email transport, address or authentication failures.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("email dispatch is not configured")]
    NotConfigured,

    #[error("invalid email address '{0}'")]
    Address(String),

    #[error("could not build email: {0}")]
    Message(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Any failure of a single workflow action. None of these end the session.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("CSV export failed: {0}")]
    Export(#[from] std::io::Error),

    #[error("another action is still running for this session")]
    Busy,
}
