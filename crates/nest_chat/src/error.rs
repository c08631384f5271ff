use nest_core::TreeError;
use thiserror::Error;

use crate::provider::LLMError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// The model call or its stream failed.
    #[error("Upstream failure: {0}")]
    Upstream(#[from] LLMError),
}

impl ChatError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ChatError::Tree(e) if e.is_invariant_violation())
    }
}
