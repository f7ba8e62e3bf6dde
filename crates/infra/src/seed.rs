//! Default catalog contents for a fresh deployment.

use tracing::info;

use lessonbook_catalog::Slot;
use lessonbook_core::{DomainResult, SlotId};

use crate::error::BookingResult;
use crate::store::CatalogStore;

const DEFAULT_SPACE: i64 = 5;

/// (topic, location, price, image)
const DEFAULT_LESSONS: [(&str, &str, u64, &str); 10] = [
    ("Math", "Hendon", 100, "math.png"),
    ("Music", "Colindale", 80, "music.png"),
    ("English", "Hendon", 90, "eng.png"),
    ("Art", "Brent", 70, "art.png"),
    ("Drama", "Brent", 85, "drama.png"),
    ("Physics", "Hendon", 110, "physics.png"),
    ("Chem", "Colindale", 105, "chem.png"),
    ("Bio", "Hendon", 95, "bio.png"),
    ("CS", "Online", 120, "cs.png"),
    ("Geo", "Online", 75, "geo.png"),
];

pub fn default_lessons() -> DomainResult<Vec<Slot>> {
    DEFAULT_LESSONS
        .iter()
        .map(|(topic, location, price, image)| {
            Slot::new(SlotId::new(), *topic, *location, *price, DEFAULT_SPACE, *image)
        })
        .collect()
}

/// Insert the default lessons if the catalog is empty. Returns how many were inserted.
pub async fn seed_if_empty<C: CatalogStore>(catalog: &C) -> BookingResult<usize> {
    if catalog.count().await? > 0 {
        return Ok(0);
    }
    let lessons = default_lessons()?;
    let inserted = lessons.len();
    for lesson in lessons {
        catalog.insert(lesson).await?;
    }
    info!(inserted, "seeded default lessons");
    Ok(inserted)
}
