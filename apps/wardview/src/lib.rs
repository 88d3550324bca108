//! Wardview client core: keeps a ward-monitoring view model converged with
//! the ward API over snapshots and push broadcasts.
//!
//! Responsibilities:
//! - maintaining one push channel per viewing scope with reconnect
//! - fetching and applying full-state snapshots with stale-response guards
//! - merging domain broadcasts into the scope's view model
//! - applying local writes optimistically with rollback on failure

pub mod api;
pub mod config;
pub mod model;
pub mod protocol;
pub mod session;
pub mod sync;
pub mod transport;
