//! Human-readable justification of condition outcomes.
//!
//! Messages are built fluently, starting with the condition being evaluated:
//!
//! ```
//! use springtime_autoconfigure::condition::message::ConditionMessage;
//!
//! let message = ConditionMessage::for_annotation("ConditionalOnWebApplication", &[])
//!     .did_not_find("servlet web application classes")
//!     .at_all();
//!
//! assert_eq!(
//!     message.to_string(),
//!     "@ConditionalOnWebApplication did not find servlet web application classes"
//! );
//! ```

use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// Style applied to items listed in a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Style {
    #[default]
    Normal,
    /// Wraps every item in single quotes.
    Quote,
}

impl Style {
    fn apply(self, item: &str) -> String {
        match self {
            Self::Normal => item.to_string(),
            Self::Quote => format!("'{item}'"),
        }
    }
}

/// An immutable justification message. Messages built on top of a non-empty prior message are
/// separated from it with `; `.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ConditionMessage {
    message: Option<String>,
}

impl ConditionMessage {
    /// Creates an empty message.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a message with given content.
    pub fn of(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: (!message.is_empty()).then_some(message),
        }
    }

    /// Starts a message for a condition, with optional details following its name.
    pub fn for_condition(condition: &str, details: &[&str]) -> ConditionMessageBuilder {
        Self::empty().and_condition(condition, details)
    }

    /// Starts a message for a conditional annotation, which is reported as `@name`.
    pub fn for_annotation(annotation: &str, details: &[&str]) -> ConditionMessageBuilder {
        Self::for_condition(&format!("@{annotation}"), details)
    }

    /// Starts a new message for a condition, following this one.
    pub fn and_condition(&self, condition: &str, details: &[&str]) -> ConditionMessageBuilder {
        let detail = details.iter().join(" ");
        let condition = if detail.is_empty() {
            condition.to_string()
        } else {
            format!("{condition} {detail}")
        };

        ConditionMessageBuilder {
            prior: self.clone(),
            condition,
        }
    }

    /// Returns a message with given text appended, separated with a space.
    pub fn append(&self, message: &str) -> Self {
        if message.is_empty() {
            return self.clone();
        }

        match &self.message {
            Some(current) => Self::of(format!("{current} {message}")),
            None => Self::of(message),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.message.is_none()
    }

    fn with_prior(prior: &ConditionMessage, message: String) -> Self {
        match &prior.message {
            Some(prior) => Self::of(format!("{prior}; {message}")),
            None => Self::of(message),
        }
    }
}

impl Display for ConditionMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or_default())
    }
}

/// Builder of a message for a single condition.
#[derive(Clone, Debug)]
pub struct ConditionMessageBuilder {
    prior: ConditionMessage,
    condition: String,
}

impl ConditionMessageBuilder {
    /// Finishes the message with a reason following the condition.
    pub fn because(&self, reason: &str) -> ConditionMessage {
        let message = if reason.is_empty() {
            self.condition.clone()
        } else if self.condition.is_empty() {
            reason.to_string()
        } else {
            format!("{} {reason}", self.condition)
        };

        ConditionMessage::with_prior(&self.prior, message)
    }

    /// Finishes the message stating a single item was found, e.g. `found 'session' scope`.
    pub fn found_exactly(&self, result: &str) -> ConditionMessage {
        self.found("").items(&[result])
    }

    /// Starts listing found items described with given article.
    pub fn found(&self, article: &str) -> ItemsBuilder {
        self.found_with_plural(article, article)
    }

    pub fn found_with_plural(&self, singular: &str, plural: &str) -> ItemsBuilder {
        ItemsBuilder::new(self.clone(), "found", singular, plural)
    }

    /// Starts listing missing items described with given article.
    pub fn did_not_find(&self, article: &str) -> ItemsBuilder {
        self.did_not_find_with_plural(article, article)
    }

    pub fn did_not_find_with_plural(&self, singular: &str, plural: &str) -> ItemsBuilder {
        ItemsBuilder::new(self.clone(), "did not find", singular, plural)
    }

    /// Finishes the message stating the item is available.
    pub fn available(&self, item: &str) -> ConditionMessage {
        self.because(&format!("{item} is available"))
    }

    /// Finishes the message stating the item is not available.
    pub fn not_available(&self, item: &str) -> ConditionMessage {
        self.because(&format!("{item} is not available"))
    }
}

/// Builder of a message listing items.
#[derive(Clone, Debug)]
pub struct ItemsBuilder {
    condition: ConditionMessageBuilder,
    reason: &'static str,
    singular: String,
    plural: String,
}

impl ItemsBuilder {
    fn new(
        condition: ConditionMessageBuilder,
        reason: &'static str,
        singular: &str,
        plural: &str,
    ) -> Self {
        Self {
            condition,
            reason,
            singular: singular.to_string(),
            plural: plural.to_string(),
        }
    }

    /// Finishes the message without listing any items.
    pub fn at_all(&self) -> ConditionMessage {
        self.items(&[])
    }

    pub fn items(&self, items: &[&str]) -> ConditionMessage {
        self.styled_items(Style::Normal, items)
    }

    /// Finishes the message listing given items. The singular article is used for at most one
    /// item.
    pub fn styled_items(&self, style: Style, items: &[&str]) -> ConditionMessage {
        let mut message = self.reason.to_string();
        let article = if items.len() <= 1 {
            &self.singular
        } else {
            &self.plural
        };

        if !article.is_empty() {
            message.push(' ');
            message.push_str(article);
        }

        if !items.is_empty() {
            message.push(' ');
            message.push_str(&items.iter().map(|item| style.apply(item)).join(", "));
        }

        self.condition.because(&message)
    }
}

#[cfg(test)]
mod tests {
    use crate::condition::message::{ConditionMessage, Style};

    #[test]
    fn should_format_condition_with_details() {
        let builder = ConditionMessage::for_annotation("ConditionalOnWebApplication", &["(required)"]);

        assert_eq!(
            builder.because("found 'session' scope").to_string(),
            "@ConditionalOnWebApplication (required) found 'session' scope"
        );
        assert_eq!(
            ConditionMessage::for_annotation("ConditionalOnWebApplication", &[""])
                .because("reason")
                .to_string(),
            "@ConditionalOnWebApplication reason"
        );
    }

    #[test]
    fn should_format_items() {
        let builder = ConditionMessage::for_condition("", &[]);

        assert_eq!(
            builder.found_exactly("'session' scope").to_string(),
            "found 'session' scope"
        );
        assert_eq!(
            builder
                .did_not_find("reactive web application classes")
                .at_all()
                .to_string(),
            "did not find reactive web application classes"
        );
        assert_eq!(
            ConditionMessage::for_condition("@ConditionalOnClass", &[])
                .found_with_plural("class", "classes")
                .styled_items(Style::Quote, &["a.A", "b.B"])
                .to_string(),
            "@ConditionalOnClass found classes 'a.A', 'b.B'"
        );
    }

    #[test]
    fn should_chain_messages() {
        let first = ConditionMessage::for_condition("@First", &[]).because("reason");
        let second = first.and_condition("@Second", &[]).available("thing");

        assert_eq!(second.to_string(), "@First reason; @Second thing is available");
        assert_eq!(
            second.append("and").append("more").to_string(),
            "@First reason; @Second thing is available and more"
        );
        assert_eq!(ConditionMessage::empty().append("").to_string(), "");
        assert!(ConditionMessage::of("").is_empty());
    }
}
