//! Combine command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::handlers::status;
use crate::CombineArgs;

/// Execute the combine command
pub fn execute_combine(config: &CliConfig, args: &CombineArgs) -> CliResult<()> {
    let output = args.output.clone().unwrap_or_else(|| config.store_path());
    let combined = instrumental::combine(&output, &args.inputs)?;
    status(
        config,
        &format!(
            "combined {} stores ({} modules) into {}",
            args.inputs.len(),
            combined.modules().len(),
            output.display()
        ),
    );
    Ok(())
}
