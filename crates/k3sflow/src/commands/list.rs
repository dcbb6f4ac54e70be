use super::Context;
use colored::Colorize;
use k3sflow_core::build_app;

/// Stands in for K3S_TOKEN; listing never renders the boot scripts for use
const PLACEHOLDER_TOKEN: &str = "placeholder";

pub fn handle(mut ctx: Context) -> anyhow::Result<()> {
    if ctx.config.join_token.is_none() {
        tracing::debug!("No join token set, listing with a placeholder");
        ctx.config.join_token = Some(PLACEHOLDER_TOKEN.to_string());
    }

    let app = build_app(&ctx.config, &ctx.assets)?;
    println!("{}", format!("Stacks of cluster {}:", ctx.config.name).bold());
    for (i, name) in app.deployment_order()?.into_iter().enumerate() {
        println!("  {}. {}", i + 1, name.cyan());
        let Some(stack) = app.stack(name) else {
            continue;
        };
        for dep in stack.dependencies() {
            println!(
                "     {} {} {}",
                "depends on".dimmed(),
                dep.stack,
                format!("({})", dep.reason).dimmed()
            );
        }
    }
    Ok(())
}
