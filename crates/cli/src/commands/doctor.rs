//! `steward doctor`: diagnose configuration.

use steward_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Steward Doctor: System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    println!("  ✅ Binary running");

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file at {}; defaults in use", config_path.display());
        issues += 1;
    }

    match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            println!("     provider={} model={} token_limit={}",
                config.provider, config.model, config.agent.token_limit);

            match steward_providers::build_from_config(&config) {
                Ok(provider) => println!("  ✅ Provider '{}' ready", provider.name()),
                Err(e) => {
                    println!("  ❌ {e}");
                    issues += 1;
                }
            }

            match &config.history.dir {
                Some(dir) if dir.is_dir() => {
                    println!("  ✅ History directory {}", dir.display());
                }
                Some(dir) => {
                    println!("  ⚠️  History directory {} will be created on first save", dir.display());
                }
                None => println!("  ℹ️  History not persisted (no [history] dir)"),
            }

            println!("  ✅ {} functions registered", steward_functions::default_registry().len());
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
        if !config_path.exists() {
            println!();
            println!("  A starter {}:", config_path.display());
            println!();
            for line in AppConfig::default_toml().lines() {
                println!("    {line}");
            }
        }
    }

    Ok(())
}
