use super::Context;
use colored::Colorize;
use k3sflow_cloud::{AssemblyManager, CloudAssembly};
use k3sflow_core::build_app;
use std::path::Path;

pub async fn handle(
    ctx: &Context,
    stacks: &[String],
    exclusively: bool,
    output: &Path,
    stdout: bool,
) -> anyhow::Result<()> {
    let app = build_app(&ctx.config, &ctx.assets)?;
    let assembly = if stacks.is_empty() {
        app.synth()?
    } else {
        let names: Vec<&str> = stacks.iter().map(String::as_str).collect();
        app.synth_selected(&names, exclusively)?
    };

    if stdout {
        return print_templates(&assembly);
    }

    println!("{}", "🔨 Synthesizing...".blue());
    println!("  {} {}", "Cluster file:".dimmed(), ctx.source_label());

    let manager = AssemblyManager::new(output);
    let lock = manager.acquire_lock().await?;
    let saved = manager.save(&assembly).await;
    lock.release().await?;
    let manifest = saved?;

    println!();
    for stack in &manifest.stacks {
        let resources = assembly
            .template(&stack.name)
            .map(|t| t.resources.len())
            .unwrap_or(0);
        println!(
            "  {} {} ({} resources)",
            "•".cyan(),
            stack.name.bold(),
            resources
        );
        println!(
            "    {}",
            manager.out_dir().join(&stack.template_file).display()
        );
    }
    println!();
    println!(
        "{}",
        format!(
            "✓ Synthesized {} stack(s) to {}",
            manifest.stacks.len(),
            manager.out_dir().display()
        )
        .green()
        .bold()
    );
    Ok(())
}

/// One stack prints its template, several print an object keyed by stack
fn print_templates(assembly: &CloudAssembly) -> anyhow::Result<()> {
    match assembly.stacks.as_slice() {
        [single] => println!("{}", single.template.to_json_pretty()?),
        many => {
            let mut all = serde_json::Map::new();
            for stack in many {
                all.insert(stack.name.clone(), serde_json::to_value(&stack.template)?);
            }
            println!("{}", serde_json::to_string_pretty(&all)?);
        }
    }
    Ok(())
}
