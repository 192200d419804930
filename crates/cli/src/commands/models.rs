//! `sovwren models` — list models available on the backend.

use sovwren_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let client = super::wiring::build_client(&config)?;

    let models = client.list_models().await?;
    if models.is_empty() {
        println!("  No models reported. Is Ollama running at {}?", config.ollama.base_url);
        return Ok(());
    }

    println!("  {} model(s) at {}:", models.len(), config.ollama.base_url);
    println!();
    for model in models {
        let marker = if model.name == config.default_model {
            "  (default)"
        } else {
            ""
        };
        match model.size {
            Some(bytes) => println!(
                "  {:<40} {:>6.1} GB{marker}",
                model.name,
                bytes as f64 / 1e9
            ),
            None => println!("  {}{marker}", model.name),
        }
    }

    Ok(())
}
