use thiserror::Error;

use crate::catalog::FALLBACK_SUGGESTIONS;

/// raw failure reported by the model client. the text is all we get, so it
/// is kept verbatim for classification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ModelError(pub String);

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<llm::error::LLMError> for ModelError {
    fn from(err: llm::error::LLMError) -> Self {
        Self(err.to_string())
    }
}

/// everything that can end a turn without a committed reply.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("empty prompt")]
    EmptyPrompt,
    #[error("a turn is already in flight")]
    Busy,
    #[error("no api key configured")]
    MissingCredential,
    #[error("model returned no content")]
    EmptyResponse,
    #[error("stream did not finish within the time budget")]
    TimedOut,
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("authorization failure: {0}")]
    AuthorizationFailure(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transport timeout: {0}")]
    TransportTimeout(String),
    #[error("model error: {0}")]
    Generic(String),
}

impl TurnError {
    /// bucket a model failure by the keywords in its text. first match wins.
    pub fn classify(err: &ModelError) -> Self {
        let text = err.0.to_lowercase();
        let detail = err.0.clone();
        if text.contains("not found") || text.contains("invalid") {
            Self::ModelUnavailable(detail)
        } else if text.contains("permission") || text.contains("access") {
            Self::AuthorizationFailure(detail)
        } else if text.contains("quota") || text.contains("limit") {
            Self::RateLimited(detail)
        } else if text.contains("timeout") {
            Self::TransportTimeout(detail)
        } else {
            Self::Generic(detail)
        }
    }

    /// informational problems that never reached the model.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::EmptyPrompt | Self::Busy | Self::MissingCredential)
    }

    /// true when the failure came from the model call itself.
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable(_)
                | Self::AuthorizationFailure(_)
                | Self::RateLimited(_)
                | Self::TransportTimeout(_)
                | Self::Generic(_)
        )
    }

    /// message shown to the user for this outcome.
    pub fn notice(&self) -> String {
        match self {
            Self::EmptyPrompt => "Please type a message before sending!".into(),
            Self::Busy => "Still waiting for the previous reply.".into(),
            Self::MissingCredential => {
                "Please enter your Google Gemini API key to start chatting.".into()
            }
            Self::EmptyResponse => {
                "No response received. This model might not be working. Please try a different model."
                    .into()
            }
            Self::TimedOut => {
                "Response timed out. This model might be unavailable. Try selecting a different model."
                    .into()
            }
            Self::ModelUnavailable(_) => {
                "This model is not available or has been deprecated. Please select a different model."
                    .into()
            }
            Self::AuthorizationFailure(_) => {
                "You don't have access to this model. Please select a different model or check your API permissions."
                    .into()
            }
            Self::RateLimited(_) => {
                "API quota exceeded. Please try again later or use a different model.".into()
            }
            Self::TransportTimeout(_) => {
                "Request timed out. This model might be overloaded. Try a different model.".into()
            }
            Self::Generic(detail) => format!(
                "Error with this model: {detail}\nSuggestion: try '{}' or '{}', these are the most reliable models.",
                FALLBACK_SUGGESTIONS[0], FALLBACK_SUGGESTIONS[1]
            ),
        }
    }

    /// extra hint listing models that usually work, shown after model failures.
    pub fn suggestion(&self) -> Option<String> {
        self.is_model_failure().then(|| {
            let mut out = String::from("Recommended models that usually work well:");
            for m in FALLBACK_SUGGESTIONS {
                out.push_str("\n- ");
                out.push_str(m);
            }
            out
        })
    }
}

/// failures while writing a transcript out.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export yet")]
    Empty,
    #[error("failed to write transcript: {0}")]
    Io(#[from] std::io::Error),
    #[error("browser download failed: {0}")]
    Browser(String),
}
