//! Replay command - loads a snapshot and applies relayed ops to it.

use livetree::{Document, KeyUpdate, ListDelta, Op, StorageUpdate};

use super::read_snapshot;
use crate::cli::ReplayArgs;
use crate::output::{OutputFormat, print_table};

/// Run the replay command
pub fn run(args: &ReplayArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = read_snapshot(&args.snapshot)?;
    let mut doc = Document::from_snapshot(args.connection_id, &snapshot)?;
    tracing::info!(nodes = doc.node_count(), "Loaded snapshot");

    let ops: Vec<Op> = match &args.ops {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            serde_json::from_str(&text)?
        }
        None => Vec::new(),
    };
    tracing::info!(ops = ops.len(), "Replaying ops");
    let updates = doc.receive(ops);

    match format {
        OutputFormat::Human => {
            println!("{}", serde_json::to_string_pretty(&doc.to_json())?);
            if !updates.is_empty() {
                println!();
                let rows: Vec<Vec<String>> = updates.iter().map(describe).collect();
                print_table(&["NODE", "KIND", "CHANGES"], &rows);
            }
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "document": doc.to_json(),
                "nodes": doc.node_count(),
                "updated": updates.iter().map(|u| u.node_id().as_str()).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    Ok(())
}

/// One table row per notification: keys written (`-key` when deleted) or
/// list deltas (`+i` insert, `-i` delete, `a->b` move, `=i` set).
fn describe(update: &StorageUpdate) -> Vec<String> {
    let keys = |updates: &std::collections::BTreeMap<String, KeyUpdate>| {
        updates
            .iter()
            .map(|(key, update)| match update {
                KeyUpdate::Updated => key.clone(),
                KeyUpdate::Deleted { .. } => format!("-{key}"),
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    let (kind, changes) = match update {
        StorageUpdate::Record { updates, .. } => ("record", keys(updates)),
        StorageUpdate::Map { updates, .. } => ("map", keys(updates)),
        StorageUpdate::List { updates, .. } => (
            "list",
            updates
                .iter()
                .map(|delta| match delta {
                    ListDelta::Insert { index, .. } => format!("+{index}"),
                    ListDelta::Delete { index, .. } => format!("-{index}"),
                    ListDelta::Move {
                        previous_index,
                        index,
                        ..
                    } => format!("{previous_index}->{index}"),
                    ListDelta::Set { index, .. } => format!("={index}"),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
    };
    vec![update.node_id().to_string(), kind.to_string(), changes]
}
