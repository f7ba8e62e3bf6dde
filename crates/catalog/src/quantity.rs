use serde::{Deserialize, Serialize};

use lessonbook_core::{DomainError, DomainResult, ValueObject};

/// A strictly positive number of places claimed from (or restored to) a slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(u32);

impl Quantity {
    /// Upper bound for a single line.
    pub const MAX: u32 = 1_000_000;

    pub fn new(value: i64) -> DomainResult<Self> {
        if value <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be a positive integer (got {value})"
            )));
        }
        if value > i64::from(Self::MAX) {
            return Err(DomainError::validation(format!(
                "quantity must not exceed {} (got {value})",
                Self::MAX
            )));
        }
        Ok(Self(value as u32))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }
}

impl ValueObject for Quantity {}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for i64 {
    fn from(value: Quantity) -> Self {
        value.as_i64()
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
