//! `sovwren doctor` — diagnose the local setup.

use sovwren_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Sovwren Doctor");
    println!("==============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    let config = if config_path.exists() {
        match AppConfig::load() {
            Ok(config) => {
                println!("  ok     config file valid");
                config
            }
            Err(e) => {
                println!("  FAIL   config file invalid: {e}");
                return Err(e.into());
            }
        }
    } else {
        println!("  info   no config file at {}, using defaults", config_path.display());
        AppConfig::default()
    };

    let workspace = AppConfig::workspace_dir();
    if workspace.exists() {
        println!("  ok     workspace directory exists");
    } else {
        println!("  info   workspace directory will be created on first chat");
    }

    match super::wiring::open_store().await {
        Ok(store) => {
            let count = store.count_sessions().await?;
            println!("  ok     session store opens ({count} sessions)");
        }
        Err(e) => {
            println!("  FAIL   session store: {e}");
            issues += 1;
        }
    }

    match super::wiring::build_client(&config) {
        Ok(client) => match client.health_check().await {
            Ok(true) => {
                println!("  ok     Ollama reachable at {}", config.ollama.base_url);
                match client.list_models().await {
                    Ok(models) if models.iter().any(|m| m.name.contains(&config.default_model)) => {
                        println!("  ok     default model '{}' present", config.default_model);
                    }
                    Ok(_) => {
                        println!(
                            "  warn   default model '{}' not pulled yet",
                            config.default_model
                        );
                        issues += 1;
                    }
                    Err(e) => {
                        println!("  warn   could not list models: {e}");
                        issues += 1;
                    }
                }
            }
            Ok(false) | Err(_) => {
                println!("  FAIL   Ollama not reachable at {}", config.ollama.base_url);
                issues += 1;
            }
        },
        Err(e) => {
            println!("  FAIL   could not build client: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above.");
    }

    Ok(())
}
