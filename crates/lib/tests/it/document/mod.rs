//! Document integration tests
//!
//! Local editing against a single replica: every mutation must be visible
//! immediately, produce the right outbound ops and notifications, and be
//! reversible through history.

mod batch_tests;
mod history_tests;
mod map_tests;
mod record_tests;
mod snapshot_tests;
