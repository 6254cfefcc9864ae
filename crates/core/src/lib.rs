//! Domain types and derived views for the HireHub back office.
//!
//! Everything here is pure: storage and HTTP live in the other crates and
//! hand snapshots of the collections to these functions.

pub mod attendance;
pub mod change;
pub mod dashboard;
pub mod document;
pub mod filter;
pub mod hierarchy;
pub mod payroll;
pub mod performance;
pub mod pipeline;
pub mod profit;
pub mod types;

pub use change::{ChangeEvent, ChangeOp};
pub use document::{Document, DocumentError, ValidationError};
pub use types::Collection;
