//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Slots and orders are entities: two records with the same id are the same
/// booking resource, whatever their current capacity or line state.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
