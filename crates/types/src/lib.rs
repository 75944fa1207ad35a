//! # MedLedger Types
//!
//! Validated primitive types shared across the MedLedger workspace.
//!
//! Fields the domain requires to be present (record titles, consent reasons,
//! participant identifiers) are carried as [`NonEmptyText`] so that emptiness
//! is rejected once, at the boundary, instead of re-checked in every service.

/// Errors that can occur when constructing validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input was empty or contained only whitespace.
    #[error("text cannot be empty")]
    Empty,
}

/// A string that is guaranteed to contain at least one non-whitespace character.
///
/// Input is trimmed of leading and trailing whitespace during construction,
/// so the stored value never carries accidental padding from form input.
///
/// # Construction
///
/// - [`NonEmptyText::new`] validates and trims arbitrary input.
/// - Deserialization applies the same validation, so a `NonEmptyText` read
///   back from disk or the wire carries the same guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner `String`.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NonEmptyText {
    type Error = TextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        NonEmptyText::new(&value)
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_text() {
        let text = NonEmptyText::new("CBC Panel").unwrap();
        assert_eq!(text.as_str(), "CBC Panel");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let text = NonEmptyText::new("  routine bloodwork \n").unwrap();
        assert_eq!(text.as_str(), "routine bloodwork");
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(NonEmptyText::new(""), Err(TextError::Empty)));
    }

    #[test]
    fn rejects_whitespace_only_input() {
        assert!(matches!(NonEmptyText::new("   \t\n"), Err(TextError::Empty)));
    }

    #[test]
    fn try_from_string_applies_validation() {
        assert!(NonEmptyText::try_from(String::from(" ")).is_err());
        assert!(NonEmptyText::try_from(String::from("x")).is_ok());
    }

    #[test]
    fn serializes_as_plain_string() {
        let text = NonEmptyText::new("second opinion").unwrap();
        let json = serde_json::to_string(&text).unwrap();
        assert_eq!(json, "\"second opinion\"");
    }

    #[test]
    fn deserialization_rejects_empty_string() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err());
    }

    #[test]
    fn deserialization_round_trips() {
        let text = NonEmptyText::new("lab report").unwrap();
        let json = serde_json::to_string(&text).unwrap();
        let back: NonEmptyText = serde_json::from_str(&json).unwrap();
        assert_eq!(text, back);
    }
}
