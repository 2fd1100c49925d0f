pub mod combine;
pub mod schema;
pub mod workflow;

use crate::openai::client::ChatError;

#[derive(Debug, thiserror::Error)]
pub enum MultiQueryError {
    #[error("question must not be empty")]
    EmptyInput,

    #[error("malformed model output in {stage}: {reason}")]
    MalformedOutput { stage: &'static str, reason: String },

    #[error("{0}")]
    Chat(#[from] ChatError),
}

impl MultiQueryError {
    pub(crate) fn malformed(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedOutput {
            stage,
            reason: reason.into(),
        }
    }
}
