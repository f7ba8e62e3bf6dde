//! Catalog listing and editing rules.
//!
//! Both in-memory and SQL stores honour the same semantics: case-insensitive
//! substring search over topic and location, a whitelisted sort key, and a
//! hard result cap.

use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use lessonbook_core::{DomainError, DomainResult};

use crate::slot::Slot;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Topic,
    Location,
    Price,
    Space,
}

impl SortKey {
    /// Accepts both storage names and the public field aliases (`subject`, `spaces`).
    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "topic" | "subject" => Ok(SortKey::Topic),
            "location" => Ok(SortKey::Location),
            "price" => Ok(SortKey::Price),
            "space" | "spaces" => Ok(SortKey::Space),
            other => Err(DomainError::validation(format!(
                "sort must be one of: subject, location, price, spaces (got {other:?})"
            ))),
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            SortKey::Topic => "topic",
            SortKey::Location => "location",
            SortKey::Price => "price",
            SortKey::Space => "space",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than `desc` sorts ascending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Listing query over the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub text: Option<String>,
    pub sort: SortKey,
    pub direction: SortDirection,
    pub limit: usize,
}

impl SlotQuery {
    pub const MAX_RESULTS: usize = 500;

    pub fn new(text: Option<String>, sort: SortKey, direction: SortDirection) -> Self {
        let text = text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self {
            text,
            sort,
            direction,
            limit: Self::MAX_RESULTS,
        }
    }

    pub fn matches(&self, slot: &Slot) -> bool {
        match &self.text {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                slot.topic.to_lowercase().contains(&needle)
                    || slot.location.to_lowercase().contains(&needle)
            }
        }
    }

    pub fn compare(&self, a: &Slot, b: &Slot) -> Ordering {
        let ord = match self.sort {
            SortKey::Topic => a.topic.cmp(&b.topic),
            SortKey::Location => a.location.cmp(&b.location),
            SortKey::Price => a.price.cmp(&b.price),
            SortKey::Space => a.space.cmp(&b.space),
        };
        let ord = match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        // Stable output across stores for equal keys.
        ord.then_with(|| a.id.cmp(&b.id))
    }

    /// Filter, sort and cap an unordered set of slots.
    pub fn apply(&self, slots: impl IntoIterator<Item = Slot>) -> Vec<Slot> {
        let mut out: Vec<Slot> = slots.into_iter().filter(|s| self.matches(s)).collect();
        out.sort_by(|a, b| self.compare(a, b));
        out.truncate(self.limit);
        out
    }
}

impl Default for SlotQuery {
    fn default() -> Self {
        Self::new(None, SortKey::default(), SortDirection::default())
    }
}

/// Partial edit of a slot's descriptive fields.
///
/// Capacity is absent: it only changes through claim/restore.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotPatch {
    pub topic: Option<String>,
    pub location: Option<String>,
    pub price: Option<u64>,
    pub image: Option<String>,
}

impl SlotPatch {
    pub fn is_empty(&self) -> bool {
        self.topic.is_none() && self.location.is_none() && self.price.is_none() && self.image.is_none()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.is_empty() {
            return Err(DomainError::validation("no valid fields to update"));
        }
        if let Some(topic) = &self.topic {
            if topic.trim().is_empty() {
                return Err(DomainError::validation("subject cannot be empty"));
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, slot: &mut Slot) {
        if let Some(topic) = &self.topic {
            slot.topic = topic.clone();
        }
        if let Some(location) = &self.location {
            slot.location = location.clone();
        }
        if let Some(price) = self.price {
            slot.price = price;
        }
        if let Some(image) = &self.image {
            slot.image = image.clone();
        }
    }
}
