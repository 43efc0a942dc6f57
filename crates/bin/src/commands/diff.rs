//! Diff command - prints the ops turning one snapshot into another.

use livetree::{Op, snapshot};

use super::read_snapshot;
use crate::cli::DiffArgs;
use crate::output::{OutputFormat, print_table};

/// Run the diff command
pub fn run(args: &DiffArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let from = read_snapshot(&args.from)?;
    let to = read_snapshot(&args.to)?;
    let ops = snapshot::diff(&from, &to)?;
    tracing::debug!(ops = ops.len(), "Computed snapshot diff");

    match format {
        OutputFormat::Human => {
            if ops.is_empty() {
                println!("Snapshots describe the same tree");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = ops.iter().map(row).collect();
            print_table(&["OP", "NODE", "DETAIL"], &rows);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&ops)?);
        }
    }

    Ok(())
}

fn row(op: &Op) -> Vec<String> {
    let node = op.node_id().map(ToString::to_string).unwrap_or_default();
    let detail = match op {
        Op::Create(create) => format!("{}[{:?}]", create.parent_id, create.parent_key),
        Op::UpdateRecord { data, .. } => data.keys().cloned().collect::<Vec<_>>().join(", "),
        Op::SetParentKey { parent_key, .. } => format!("{parent_key:?}"),
        Op::DeleteKey { key, .. } => key.clone(),
        Op::DeleteNode { .. } | Op::Ack { .. } => String::new(),
    };
    vec![op.type_name().to_string(), node, detail]
}
