//! Diff command - prints the edit script between two texts as JSON lines.

use tessera::diff::diff;

use crate::cli::DiffArgs;

/// Run the diff command
pub fn run(args: &DiffArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (old, new) = if args.literal {
        (args.old.clone(), args.new.clone())
    } else {
        (
            std::fs::read_to_string(&args.old)?,
            std::fs::read_to_string(&args.new)?,
        )
    };

    let ops = diff(&old, &new);
    tracing::debug!(operations = ops.len(), "Computed diff");
    for op in &ops {
        println!("{}", serde_json::to_string(op)?);
    }
    Ok(())
}
