//! Storage hooks for observing changes to a document.
//!
//! Hooks are called after every dispatched local mutation, closed batch,
//! undo/redo step and inbound op array that changed at least one node. They
//! receive the merged [`StorageUpdate`]s, one per affected node.

use std::sync::Arc;

use crate::Result;
use crate::update::StorageUpdate;

/// Trait for implementing hooks that are notified about storage changes.
pub trait StorageHook: Send + Sync {
    /// Called once per notification with the merged updates.
    ///
    /// Hook failures never roll back the change that triggered them; they are
    /// logged and the remaining hooks still run.
    fn on_storage_updated(&self, updates: &[StorageUpdate]) -> Result<()>;
}

impl<F> StorageHook for F
where
    F: Fn(&[StorageUpdate]) -> Result<()> + Send + Sync,
{
    fn on_storage_updated(&self, updates: &[StorageUpdate]) -> Result<()> {
        self(updates)
    }
}

/// A collection of storage hooks executed together, in registration order.
#[derive(Default)]
pub struct StorageHookCollection {
    hooks: Vec<Arc<dyn StorageHook>>,
}

impl StorageHookCollection {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn add_hook(&mut self, hook: Arc<dyn StorageHook>) {
        self.hooks.push(hook);
    }

    /// Execute all hooks with the given updates.
    ///
    /// Empty notifications are skipped. If a hook fails, execution continues
    /// with the remaining hooks and the first error is returned.
    pub fn execute_hooks(&self, updates: &[StorageUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut first_error = None;
        for hook in &self.hooks {
            if let Err(e) = hook.on_storage_updated(updates) {
                tracing::error!("Storage hook failed: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for StorageHookCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHookCollection")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
