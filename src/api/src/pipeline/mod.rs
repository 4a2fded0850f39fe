//! Offline processing between the scrape and the load.

pub mod clean;

pub use clean::{clean_file, CleanRecord, CleanReport};
