//! Measurement data deletion and rollback reconciliation.
//!
//! [`MeasurementDataDeleter`] drives a single-transaction cascading
//! deletion over attribution state: it resolves the entities a
//! [`attrix_core::deletion::DeletionParam`] names, resets the dedup keys
//! and aggregate-contribution budgets those entities consumed, and then
//! either hard-deletes the rows or quarantines them as marked-to-delete.
//!
//! [`RollbackReconciliationManager`] keeps deletions effective across OS
//! module rollbacks: it records the module version a deletion ran under
//! and reports when a restored-from-rollback database needs to be wiped
//! again.

pub mod apex;
pub mod contributions;
pub mod dedup;
pub mod deleter;
pub mod reconcile;
pub mod wipeout;

pub use deleter::{DeleterConfig, MeasurementDataDeleter};
pub use reconcile::RollbackReconciliationManager;
