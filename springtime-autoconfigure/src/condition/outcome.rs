use crate::condition::message::ConditionMessage;
use derive_more::Constructor;
use std::fmt::{Display, Formatter};

/// Result of evaluating a condition: a match decision with its justification.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Constructor)]
pub struct ConditionOutcome {
    is_match: bool,
    message: ConditionMessage,
}

impl ConditionOutcome {
    #[inline]
    pub fn matched(message: ConditionMessage) -> Self {
        Self::new(true, message)
    }

    #[inline]
    pub fn no_match(message: ConditionMessage) -> Self {
        Self::new(false, message)
    }

    #[inline]
    pub fn is_match(&self) -> bool {
        self.is_match
    }

    #[inline]
    pub fn condition_message(&self) -> &ConditionMessage {
        &self.message
    }

    /// Returns the justification as text.
    pub fn message(&self) -> String {
        self.message.to_string()
    }

    /// Returns an outcome with the opposite decision and the same justification.
    pub fn inverse(&self) -> Self {
        Self::new(!self.is_match, self.message.clone())
    }
}

impl Display for ConditionOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.message, f)
    }
}
