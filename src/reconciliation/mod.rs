//! Set reconciliation for ordered, uniquely keyed child records.
//!
//! Given the rows a parent currently owns and the caller's desired ordered
//! list, [`Reconciler::compute_plan`] produces a [`Plan`]: which rows to
//! delete, which to keep (with their flag and position recomputed) and which
//! to insert. Exactly one child of a non-empty set carries the selection flag
//! afterwards; the earliest entry flagged by the caller wins, otherwise the
//! first entry.
//!
//! Planning is pure. Applying a plan is the job of the store-facing
//! executor (see [`crate::services::product_images`]).

pub mod error;
pub mod plan;
pub mod reconciler;
pub mod validate;

pub use error::ReconcileError;
pub use plan::{Plan, PlannedInsert, PlannedUpdate};
pub use reconciler::{compute_plan, ChildRecord, DesiredEntry, KeyValidator, Reconciler};
