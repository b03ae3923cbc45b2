// src/harvest/mod.rs

//! Result retrieval over the service proxy.

pub mod harvester;
pub mod junit;
pub mod listing;
pub mod results;

pub use harvester::harvest;
pub use junit::ensure_passing_junit;
pub use listing::{Listing, parse_listing};
pub use results::ResultSet;
