//! Completion error types

use thiserror::Error;

pub const UNAUTHORIZED_TEXT: &str = "API key error. Please check your OpenAI API key.";
pub const NO_RESPONSE_TEXT: &str =
    "No response received from the server. Please check your internet connection.";
pub const GENERIC_FAILURE_TEXT: &str = "Sorry, I couldn't fetch a response.";

/// Why an exchange with the completion service failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The service rejected the credential (401)
    #[error("unauthorized")]
    Unauthorized,

    /// Any other error status, with the structured message if the body had one
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no error message"))]
    Api { status: u16, message: Option<String> },

    /// The request went out but no response came back (connect failure, timeout)
    #[error("no response: {0}")]
    NoResponse(String),

    /// The request could not be built or sent at all (bad URL, bad header value)
    #[error("request error: {0}")]
    Request(String),

    /// A success status whose body could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CompletionError {
    /// Text appended to the transcript when this error ends an exchange
    pub fn transcript_text(&self) -> String {
        match self {
            CompletionError::Unauthorized => UNAUTHORIZED_TEXT.to_string(),
            CompletionError::Api {
                message: Some(message),
                ..
            } => format!("Error: {}", message),
            CompletionError::Api { message: None, .. } => GENERIC_FAILURE_TEXT.to_string(),
            CompletionError::NoResponse(_) => NO_RESPONSE_TEXT.to_string(),
            CompletionError::Request(_) | CompletionError::InvalidResponse(_) => {
                GENERIC_FAILURE_TEXT.to_string()
            }
        }
    }
}
