/*! Integration tests for livetree.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure:
 * - document: Local editing through a single Document (records, lists, maps,
 *   history, batching, read-only mode, snapshots)
 * - sync: Several replicas connected through an in-process ordering
 *   authority, covering concurrent edits and convergence
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("livetree=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod document;
mod helpers;
mod sync;
