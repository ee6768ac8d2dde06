use derive_more::derive::Display;

pub type AppResult<T> = Result<T, AppError>;

/// Failure of one pipeline job, tagged with the stage it came from.
///
/// The stage decides how a poller reacts: persistence failures stop the poller,
/// everything else is logged and the poller keeps going.
#[derive(Debug, Display)]
pub enum AppError {
    #[display("fetch failed: {_0}")]
    Fetch(anyhow::Error),
    #[display("parse failed: {_0}")]
    Parse(ParseError),
    #[display("graph build failed: {_0}")]
    Graph(anyhow::Error),
    #[display("persistence failed: {_0}")]
    Persistence(anyhow::Error),
    #[display("queue closed: {_0}")]
    QueueClosed(String),
    #[display("internal error: {_0}")]
    Internal(anyhow::Error),
}

impl std::error::Error for AppError {}

impl AppError {
    /// Persistence failures leave the store in an unknown state
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Persistence(_))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<ParseError> for AppError {
    fn from(error: ParseError) -> Self {
        AppError::Parse(error)
    }
}

impl From<sea_orm::error::DbErr> for AppError {
    fn from(error: sea_orm::error::DbErr) -> Self {
        AppError::Persistence(error.into())
    }
}

/// Errors that abort parsing of a whole message
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("message {message_id} has no internal date")]
    MissingDate { message_id: String },
    #[error("message {message_id} has malformed internal date {value:?}")]
    MalformedDate { message_id: String, value: String },
    #[error("message {message_id} has no payload")]
    MissingPayload { message_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_persistence_is_fatal() {
        assert!(AppError::Persistence(anyhow::anyhow!("insert")).is_fatal());
        assert!(!AppError::Fetch(anyhow::anyhow!("timeout")).is_fatal());
        assert!(!AppError::Parse(ParseError::MissingDate {
            message_id: "m1".to_string()
        })
        .is_fatal());
    }

    #[test]
    fn test_display_includes_stage() {
        let err = AppError::Graph(anyhow::anyhow!("bad rows"));
        assert_eq!(err.to_string(), "graph build failed: bad rows");
    }
}
