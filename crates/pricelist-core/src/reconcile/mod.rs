//! Reconciliation of extracted records against the reference catalog.
//!
//! Identifiers are compared in [`normalize`]d form. Ambiguous or absent
//! identifiers may be handed to a generative model, whose answers are
//! parsed leniently; matching itself never fails.

mod catalog;
mod matcher;
mod normalize;

pub use catalog::Catalog;
pub use matcher::{MatchOptions, Reconciler};
pub use normalize::normalize;
