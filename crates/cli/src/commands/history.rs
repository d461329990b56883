//! `steward history`: inspect stored conversation histories.

use steward_config::AppConfig;
use steward_core::history::HistoryStore;
use steward_core::message::Role;
use steward_memory::FileHistoryStore;

/// The store the agent writes to for the configured provider.
fn store(config: &AppConfig) -> Result<FileHistoryStore, Box<dyn std::error::Error>> {
    let dir = config
        .history
        .dir
        .as_ref()
        .ok_or("History is not persisted; set [history] dir or STEWARD_HISTORY_DIR")?;
    Ok(FileHistoryStore::new(dir.join(&config.provider)))
}

pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = store(&config)?;

    let keys = store.keys().await?;
    println!("Stored histories in {}", store.dir().display());
    println!();
    if keys.is_empty() {
        println!("   None yet.");
    }
    for key in keys {
        let history = store.load(&key).await?.into_history();
        println!("  {key:<24} {:>4} messages", history.len());
    }

    Ok(())
}

pub async fn show(key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let history = store(&config)?.load(key).await?.into_history();

    if history.is_empty() {
        println!("No history stored for '{key}'.");
        return Ok(());
    }

    for message in history.messages() {
        let who = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        };
        match &message.function_call {
            Some(call) => println!("[{who}] -> {}({})", call.name, call.arguments),
            None => println!("[{who}] {}", message.content.as_deref().unwrap_or("")),
        }
    }

    Ok(())
}
