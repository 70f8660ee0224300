use std::path::Path;
use switchyard_llm::config::{ProviderConfig, RouterSettings, RoutingConfig};
use switchyard_llm::util::mask_api_key;
use switchyard_llm::ProviderKind;

pub fn run(settings: RouterSettings) -> anyhow::Result<()> {
    println!("🏥 Switchyard Doctor\n");

    let mut all_ok = true;

    let config = check_documents(&settings.config_dir);
    all_ok &= config.is_some();
    if let Some(config) = &config {
        all_ok &= check_credentials(config);
    }
    all_ok &= check_writable("cache directory", &settings.cache.resolved_dir());
    if settings.usage_log.enabled {
        let path = settings.usage_log.resolved_path();
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        all_ok &= check_writable("usage log directory", parent);
    }

    println!();
    if all_ok {
        println!("✅ All checks passed! Ready to route.");
    } else {
        println!("⚠️  Some checks failed. Please fix the issues above.");
        std::process::exit(1);
    }

    Ok(())
}

fn check_documents(dir: &Path) -> Option<RoutingConfig> {
    print!("Checking routing documents in {}... ", dir.display());

    match RoutingConfig::load(dir) {
        Ok(config) => {
            println!(
                "✅ {} models, {} tiers, {} tasks",
                config.models.len(),
                config.tiers.len(),
                config.tasks.len()
            );
            Some(config)
        }
        Err(e) => {
            println!("❌ {e}");
            None
        }
    }
}

fn check_credentials(config: &RoutingConfig) -> bool {
    println!("Checking provider credentials...");

    let mut any = false;
    for kind in ProviderKind::ALL {
        let Some(provider) = config.providers.get(&kind) else {
            continue;
        };
        any |= report_provider(kind, provider);
    }

    if !any {
        println!("  ❌ No provider has credentials; every call will fail");
    }
    any
}

fn report_provider(kind: ProviderKind, provider: &ProviderConfig) -> bool {
    if !provider.enabled {
        println!("  ⏸️  {kind}: disabled");
        return false;
    }

    match std::env::var(&provider.api_key_env) {
        Ok(key) if !key.trim().is_empty() => {
            println!("  ✅ {kind}: {} = {}", provider.api_key_env, mask_api_key(&key));
            true
        }
        _ => {
            println!("  ⚠️  {kind}: {} not set", provider.api_key_env);
            false
        }
    }
}

fn check_writable(label: &str, dir: &Path) -> bool {
    print!("Checking {label} {}... ", dir.display());

    if let Err(e) = std::fs::create_dir_all(dir) {
        println!("❌ {e}");
        return false;
    }
    let probe = dir.join(".switchyard-doctor");
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            println!("✅ Writable");
            true
        }
        Err(e) => {
            println!("❌ {e}");
            false
        }
    }
}
