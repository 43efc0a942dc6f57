//! Multi-replica tests
//!
//! Clients edit concurrently, then exchange ops through the in-process
//! authority of [`crate::helpers::Network`]. Each test fixes the order in
//! which the authority sees the ops and checks that every replica ends in the
//! authority's state.

mod map_conflicts;
mod record_conflicts;
