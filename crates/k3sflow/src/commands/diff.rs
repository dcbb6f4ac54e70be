use super::Context;
use colored::Colorize;
use k3sflow_cloud::{ActionType, AssemblyManager, plan_assembly};
use k3sflow_core::build_app;
use std::path::Path;

pub async fn handle(ctx: &Context, output: &Path) -> anyhow::Result<()> {
    let manager = AssemblyManager::new(output);
    let previous = manager.load().await?;
    if previous.is_none() {
        println!(
            "{}",
            format!(
                "No previous assembly in {}, every resource is new",
                manager.out_dir().display()
            )
            .yellow()
        );
    }

    let next = build_app(&ctx.config, &ctx.assets)?.synth()?;
    let plans = plan_assembly(previous.as_ref(), &next);

    let mut changed = 0;
    for plan in &plans {
        println!();
        println!("{}", format!("Stack {}", plan.stack).bold());
        if !plan.has_changes {
            println!("  {}", "no changes".dimmed());
            continue;
        }
        changed += 1;
        for action in plan.actions.iter().filter(|a| a.action_type != ActionType::NoOp) {
            let symbol = match action.action_type {
                ActionType::Create => "+".green(),
                ActionType::Update => "~".yellow(),
                ActionType::Replace => "±".red().bold(),
                ActionType::Delete => "-".red(),
                ActionType::NoOp => " ".normal(),
            };
            let path = action
                .construct_path
                .as_deref()
                .unwrap_or(&action.logical_id);
            println!(
                "  {} {} {} {}",
                symbol,
                action.resource_type.cyan(),
                path,
                format!("({})", action.description).dimmed()
            );
        }
        println!("  {}", plan.summary());
    }

    println!();
    if changed == 0 {
        println!("{}", "✓ No differences".green().bold());
    } else {
        println!(
            "{}",
            format!("{} stack(s) with differences", changed).yellow().bold()
        );
    }
    Ok(())
}
