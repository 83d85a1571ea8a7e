//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stock items, work orders and unit serials are entities: two records with the
/// same identifier are the same thing, whatever their current quantities or
/// status.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
