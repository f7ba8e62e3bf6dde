use serde::{Deserialize, Serialize};

use lessonbook_core::{DomainError, DomainResult, ValueObject};

/// A customer name after whitespace normalisation.
///
/// Letters separated by single spaces, hyphens or apostrophes; starts and ends
/// with a letter; at least two characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerName(String);

impl CustomerName {
    pub const MIN_LEN: usize = 2;

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let normalized = normalize_whitespace(raw);
        if normalized.chars().count() < Self::MIN_LEN {
            return Err(DomainError::validation(
                "name must be at least 2 characters",
            ));
        }
        if !is_letters_with_single_separators(&normalized) {
            return Err(DomainError::validation(
                "name may contain only letters separated by single spaces, hyphens or apostrophes",
            ));
        }
        Ok(Self(normalized))
    }

    /// Rebuild a name that was validated when it was first stored.
    pub fn from_stored(stored: String) -> Self {
        Self(stored)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for CustomerName {}

impl core::fmt::Display for CustomerName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A permissively validated phone number (stored as typed, trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub const MIN_LEN: usize = 7;
    pub const MAX_LEN: usize = 15;

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let phone = raw.trim();
        let len = phone.chars().count();
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&len) {
            return Err(DomainError::validation(
                "phone must be 7 to 15 characters long",
            ));
        }

        let mut has_digit = false;
        for (idx, c) in phone.chars().enumerate() {
            match c {
                '0'..='9' => has_digit = true,
                ' ' | '-' | '(' | ')' => {}
                '+' if idx == 0 => {}
                _ => {
                    return Err(DomainError::validation(
                        "phone may contain only digits, spaces, '-', '(', ')' and a leading '+'",
                    ));
                }
            }
        }
        if !has_digit {
            return Err(DomainError::validation("phone must contain digits"));
        }

        Ok(Self(phone.to_string()))
    }

    pub fn from_stored(stored: String) -> Self {
        Self(stored)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for PhoneNumber {}

impl core::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: CustomerName,
    pub phone: PhoneNumber,
}

impl Customer {
    pub fn parse(name: &str, phone: &str) -> DomainResult<Self> {
        Ok(Self {
            name: CustomerName::parse(name)?,
            phone: PhoneNumber::parse(phone)?,
        })
    }

    /// Rehydrate persisted contact details as stored, without re-validation.
    pub fn from_stored(name: String, phone: String) -> Self {
        Self {
            name: CustomerName::from_stored(name),
            phone: PhoneNumber::from_stored(phone),
        }
    }
}

fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_separator(c: char) -> bool {
    matches!(c, ' ' | '-' | '\'')
}

fn is_letters_with_single_separators(s: &str) -> bool {
    let mut prev_was_separator = true; // forbids a leading separator
    for c in s.chars() {
        if c.is_alphabetic() {
            prev_was_separator = false;
        } else if is_separator(c) {
            if prev_was_separator {
                return false;
            }
            prev_was_separator = true;
        } else {
            return false;
        }
    }
    !prev_was_separator
}
