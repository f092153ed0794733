use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Per-field validation messages for a rejected submission.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Record a message against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages recorded against the given field.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` if nothing was recorded, otherwise a validation error.
    pub fn into_result(self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let fields = self.0.keys().cloned().collect::<Vec<_>>();
        write!(f, "errors in {}", fields.join(", "))
    }
}

/// Check a required text field, returning its trimmed value.
/// Length is counted in characters, not bytes.
pub fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: &str,
    max_len: usize,
) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(field, "This field is required.");
    } else if trimmed.chars().count() > max_len {
        errors.add(
            field,
            format!("Ensure this value has at most {max_len} characters."),
        );
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_messages() {
        let mut errors = FieldErrors::default();
        assert!(errors.is_empty());
        errors.add("title", "first");
        errors.add("title", "second");
        errors.add("options", "third");
        assert_eq!(errors.get("title").unwrap(), &["first", "second"]);
        assert_eq!(errors.to_string(), "errors in options, title");
        assert!(matches!(errors.into_result(), Err(Error::Validation(_))));
    }

    #[test]
    fn required_text_counts_characters() {
        let mut errors = FieldErrors::default();
        // Five multi-byte characters fit in a five character limit.
        let value = required_text(&mut errors, "title", "  アンケート ", 5);
        assert_eq!(value, "アンケート");
        assert!(errors.is_empty());

        required_text(&mut errors, "title", "   ", 5);
        required_text(&mut errors, "label", "abcdef", 5);
        assert_eq!(errors.get("title").unwrap().len(), 1);
        assert_eq!(errors.get("label").unwrap().len(), 1);
    }
}
