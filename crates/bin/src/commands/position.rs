//! Position command - computes list positions.

use livetree::Position;

use crate::cli::PositionCommand;
use crate::output::OutputFormat;

/// Run the position command
pub fn run(command: &PositionCommand, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let position = match command {
        PositionCommand::After { position } => parse(position)?.after(),
        PositionCommand::Before { position } => parse(position)?.before(),
        PositionCommand::Between { first, second } => {
            let first = parse(first)?;
            let second = parse(second)?;
            if first == second {
                return Err(format!("no position between {:?} and itself", first.as_str()).into());
            }
            first.between(&second)
        }
    };

    match format {
        // Quoted so that spaces stay visible
        OutputFormat::Human => println!("{:?}", position.as_str()),
        OutputFormat::Json => println!("{}", serde_json::to_string(&position)?),
    }
    Ok(())
}

fn parse(raw: &str) -> Result<Position, Box<dyn std::error::Error>> {
    if !Position::is_valid(raw) {
        return Err(format!(
            "invalid position {raw:?} (closest valid position is {:?})",
            Position::normalize(raw).as_str()
        )
        .into());
    }
    Ok(Position::normalize(raw))
}
