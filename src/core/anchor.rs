//! Inline-comment anchors: `[start, end)` code-point ranges into a description

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// A validated anchor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub linked_text: String,
    pub start: i64,
    pub end: i64,
}

impl Anchor {
    /// Build an anchor from the three optional inline fields.
    ///
    /// All three absent yields `None`; a partial set, an empty range or a
    /// negative start is a validation error.
    pub fn from_parts(
        linked_text: Option<String>,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Option<Self>> {
        match (linked_text, start, end) {
            (None, None, None) => Ok(None),
            (Some(linked_text), Some(start), Some(end)) => {
                Self::new(linked_text, start, end).map(Some)
            }
            _ => Err(Error::validation(
                "linked_text, text_position_start and text_position_end must be set together",
            )),
        }
    }

    pub fn new(linked_text: impl Into<String>, start: i64, end: i64) -> Result<Self> {
        let linked_text = linked_text.into();
        if start < 0 {
            return Err(Error::validation(format!(
                "text_position_start must be >= 0 (got {})",
                start
            )));
        }
        if end <= start {
            return Err(Error::validation(format!(
                "text_position_end ({}) must be greater than text_position_start ({})",
                end, start
            )));
        }
        if linked_text.is_empty() {
            return Err(Error::validation("linked_text must not be empty"));
        }
        Ok(Self {
            linked_text,
            start,
            end,
        })
    }

    /// Whether the anchor still matches `description`
    pub fn matches(&self, description: &str) -> bool {
        char_slice(description, self.start, self.end).is_some_and(|s| s == self.linked_text)
    }

    /// Check at creation time; mismatch names what the range currently holds
    pub fn verify(&self, description: &str) -> Result<()> {
        match char_slice(description, self.start, self.end) {
            Some(s) if s == self.linked_text => Ok(()),
            Some(s) => Err(Error::validation(format!(
                "linked_text '{}' does not match description[{}..{}] = '{}'",
                self.linked_text, self.start, self.end, s
            ))),
            None => Err(Error::validation(format!(
                "range [{}, {}) is outside the description ({} characters)",
                self.start,
                self.end,
                description.chars().count()
            ))),
        }
    }
}

/// Substring `[start, end)` counted in Unicode scalar values
pub fn char_slice(text: &str, start: i64, end: i64) -> Option<&str> {
    if start < 0 || end < start {
        return None;
    }
    let start = usize::try_from(start).ok()?;
    let end = usize::try_from(end).ok()?;

    let mut indices = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()));
    let begin = indices.nth(start)?;
    let finish = if end == start {
        begin
    } else {
        indices.nth(end - start - 1)?
    };
    text.get(begin..finish)
}

/// Keys of the anchors that no longer match a new description
pub fn stale_anchors<'a, I, K>(new_description: &str, anchors: I) -> Vec<K>
where
    I: IntoIterator<Item = (K, &'a Anchor)>,
{
    anchors
        .into_iter()
        .filter(|(_, anchor)| !anchor.matches(new_description))
        .map(|(key, _)| key)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESC: &str = "The system implements OAuth 2.0 authentication flow for login.";

    #[test]
    fn test_ascii_slice() {
        assert_eq!(char_slice(DESC, 22, 51), Some("OAuth 2.0 authentication flow"));
        assert_eq!(char_slice("abc", 0, 3), Some("abc"));
        assert_eq!(char_slice("abc", 3, 3), Some(""));
        assert_eq!(char_slice("abc", 2, 4), None);
    }

    #[test]
    fn test_code_point_offsets_under_multibyte_text() {
        let text = "naïve café ✓ done";
        assert_eq!(char_slice(text, 6, 10), Some("café"));
        assert_eq!(char_slice(text, 11, 12), Some("✓"));
    }

    #[test]
    fn test_anchor_requires_all_or_nothing() {
        assert_eq!(Anchor::from_parts(None, None, None).unwrap(), None);
        assert!(Anchor::from_parts(Some("x".into()), Some(0), None).is_err());
        assert!(Anchor::from_parts(None, Some(0), Some(1)).is_err());
    }

    #[test]
    fn test_empty_or_inverted_range_rejected() {
        assert!(Anchor::new("x", 5, 5).is_err());
        assert!(Anchor::new("x", 5, 4).is_err());
        assert!(Anchor::new("x", -1, 2).is_err());
    }

    #[test]
    fn test_verify_and_staleness() {
        let anchor = Anchor::new("OAuth 2.0 authentication flow", 23, 52).unwrap();
        assert!(anchor.verify(DESC).is_err());

        let anchor = Anchor::new("OAuth 2.0 authentication flow", 22, 51).unwrap();
        assert!(anchor.verify(DESC).is_ok());

        let updated = "The system implements SAML authentication flow for login.";
        assert!(!anchor.matches(updated));
        let stale = stale_anchors(updated, vec![(1, &anchor)]);
        assert_eq!(stale, vec![1]);
    }
}
