//! Normalized product and market names.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`NormalizedName`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The input is empty or whitespace only.
    #[error("name cannot be empty")]
    Empty,
    /// The input is too long.
    #[error("name must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// A product or market name in its de-duplication form.
///
/// Normalization trims the input, collapses inner whitespace runs to a single
/// space and lowercases it. Two inputs that normalize to the same value name
/// the same product (or market).
///
/// ## Examples
///
/// ```
/// use shoplist_core::NormalizedName;
///
/// let milk = NormalizedName::parse("  Milk ").unwrap();
/// assert_eq!(milk.as_str(), "milk");
/// assert_eq!(milk, NormalizedName::parse("MILK").unwrap());
/// assert_eq!(milk.display_name(), "Milk");
///
/// assert!(NormalizedName::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedName(String);

impl NormalizedName {
    /// Maximum length of a name, in characters.
    pub const MAX_LENGTH: usize = 100;

    /// Parse and normalize a name.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is blank or longer than
    /// [`Self::MAX_LENGTH`] characters after normalization.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        let normalized = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        if normalized.is_empty() {
            return Err(NameError::Empty);
        }

        if normalized.chars().count() > Self::MAX_LENGTH {
            return Err(NameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        Ok(Self(normalized))
    }

    /// Returns the normalized name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Name formatted for display, with the first letter capitalized.
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut chars = self.0.chars();
        chars.next().map_or_else(String::new, |first| {
            first.to_uppercase().chain(chars).collect()
        })
    }
}

impl fmt::Display for NormalizedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for NormalizedName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NormalizedName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NormalizedName> for String {
    fn from(name: NormalizedName) -> Self {
        name.0
    }
}

impl AsRef<str> for NormalizedName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_lowercases() {
        let name = NormalizedName::parse("  Leite Integral  ").unwrap();
        assert_eq!(name.as_str(), "leite integral");
    }

    #[test]
    fn test_parse_collapses_inner_whitespace() {
        let name = NormalizedName::parse("olive \t  oil").unwrap();
        assert_eq!(name.as_str(), "olive oil");
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert_eq!(NormalizedName::parse(""), Err(NameError::Empty));
        assert_eq!(NormalizedName::parse(" \n "), Err(NameError::Empty));
    }

    #[test]
    fn test_parse_rejects_too_long() {
        let long = "a".repeat(NormalizedName::MAX_LENGTH + 1);
        assert_eq!(
            NormalizedName::parse(&long),
            Err(NameError::TooLong {
                max: NormalizedName::MAX_LENGTH
            })
        );
    }

    #[test]
    fn test_display_name_capitalizes_first_letter() {
        assert_eq!(NormalizedName::parse("ÁGUA").unwrap().display_name(), "Água");
        assert_eq!(NormalizedName::parse("bread").unwrap().display_name(), "Bread");
    }

    #[test]
    fn test_deserialize_normalizes() {
        let name: NormalizedName = serde_json::from_str("\" StoreA \"").unwrap();
        assert_eq!(name.as_str(), "storea");
        assert!(serde_json::from_str::<NormalizedName>("\"  \"").is_err());
    }
}
