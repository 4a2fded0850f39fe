//! Analytical dashboard views over the joined results.
//!
//! Each page fetches its date range, applies its selections and returns a
//! serializable view model; rendering is left to the client.

pub mod context;
pub mod filters;
pub mod format;
pub mod pages;
pub mod table;

pub use context::{DateRange, PageContext};
pub use table::ResultRecord;
