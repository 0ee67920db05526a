//! `stackline teardown`: Display the order resources are destroyed in.

use clap::Args;
use stackline_common::config::StacklineConfig;

use crate::output;

/// Arguments for the `teardown` command.
#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Print the order as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `teardown` command.
///
/// Dependents are listed before their dependencies, so every compute
/// resource precedes every network resource.
///
/// # Errors
///
/// Returns an error if composition fails or the graph has a cycle.
pub fn execute(args: TeardownArgs, config: StacklineConfig) -> anyhow::Result<()> {
    let composition = stackline_sdk::compose(&config)?;
    let app = &composition.app;
    let order = app.teardown_order()?;

    if args.json {
        let entries: Vec<serde_json::Value> = order
            .iter()
            .map(|r| {
                serde_json::json!({
                    "stack": app.graph().stack_name(r.stack),
                    "logicalId": r.logical_id,
                    "type": r.kind.type_name(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Teardown Order");
    println!("{}", output::rule(40));
    for (step, resource) in order.iter().enumerate() {
        println!(
            "  {:>3}. - {:<12} {:<36} {}",
            step + 1,
            app.graph().stack_name(resource.stack).unwrap_or_default(),
            resource.logical_id,
            resource.kind.type_name()
        );
    }
    Ok(())
}
