//! `stackline plan`: Display stacks and resources in creation order.

use clap::Args;
use stackline_common::config::StacklineConfig;

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Print resource properties too.
    #[arg(long)]
    pub verbose: bool,
}

/// Executes the `plan` command.
///
/// Composes the topology, validates the graph, and lists every resource
/// in the order an apply engine creates them.
///
/// # Errors
///
/// Returns an error if composition or validation fails.
pub fn execute(args: PlanArgs, config: StacklineConfig) -> anyhow::Result<()> {
    let composition = stackline_sdk::compose(&config)?;
    let app = &composition.app;
    app.validate()?;
    let order = app.deployment_order()?;

    println!("Deployment Plan");
    println!("{}", output::rule(40));
    for module in app.modules() {
        println!();
        println!("  Stack {}", module.name);
        for resource in order.iter().filter(|r| r.stack == module.stack) {
            println!("    + {:<36} {}", resource.logical_id, resource.kind.type_name());
            if args.verbose {
                for (key, value) in &resource.properties {
                    println!("        {key}: {}", output::format_value(value));
                }
            }
        }
    }
    println!();
    println!(
        "  {} resource(s) in {} stack(s) will be created.",
        order.len(),
        app.modules().len()
    );
    println!(
        "  Rollback on failed deployment: {}",
        if composition.compute.deployment.rollback { "enabled" } else { "disabled" }
    );
    println!(
        "  Bake window: {}s",
        composition.compute.rollout(None).bake_window().as_secs()
    );
    Ok(())
}
