use anyhow::Context;
use switchyard_llm::{RouterSettings, RoutingConfig};

pub fn run(settings: RouterSettings, task: &str) -> anyhow::Result<()> {
    let config = RoutingConfig::load(&settings.config_dir).with_context(|| {
        format!(
            "Failed to load routing documents from {}",
            settings.config_dir.display()
        )
    })?;
    let resolved = config
        .resolve(task, &settings.force)
        .with_context(|| format!("Failed to resolve task '{task}'"))?;

    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}
