use super::Context;
use colored::Colorize;
use k3sflow_core::build_app;

pub fn handle(ctx: &Context) -> anyhow::Result<()> {
    println!("{}", "🔍 Validating cluster...".blue());
    println!("  {} {}", "Cluster file:".dimmed(), ctx.source_label());

    let config = &ctx.config;
    let assembly = build_app(config, &ctx.assets)?.synth()?;

    println!();
    println!("  {} {}", "Cluster:".bold(), config.name);
    println!("  {} {}", "Network:".bold(), config.network.cidr);
    println!(
        "  {} {} ({}, {})",
        "Control plane:".bold(),
        k3sflow_core::topology::CONTROL_PLANE_NAME,
        config.control_plane.instance_type,
        config.control_plane.placement
    );
    println!(
        "  {} {} x {}",
        "Agents:".bold(),
        config.agents.count,
        config.agents.instance_type
    );
    println!("  {} {}", "API port:".bold(), config.api_port);

    println!();
    for stack in &assembly.stacks {
        let exports = stack.template.exports();
        println!(
            "  {} {}: {} resources, {} exports",
            "•".cyan(),
            stack.name.bold(),
            stack.template.resources.len(),
            exports.len()
        );
    }

    println!();
    println!("{}", "✓ Cluster is valid".green().bold());
    Ok(())
}
