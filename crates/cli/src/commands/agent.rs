//! `steward agent`: interactive or single-message chat mode.
//!
//! Both modes go through the same path a remote transport would: envelopes
//! are routed to the session for the terminal chat, and replies come back
//! through [`CliChannel`]. The prompt is shown again once the turn's end
//! marker arrives.

use std::io::Write;
use std::sync::Arc;
use steward_channels::{CLI_CHAT_ID, CLI_USER_ID, CliChannel};
use steward_config::AppConfig;
use steward_core::channel::{InboundKind, InboundMessage};
use steward_gateway::SessionRouter;
use tracing::info;

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early, with a clear error
    let provider = match steward_providers::build_from_config(&config) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!();
            eprintln!("  ERROR: {e}");
            eprintln!();
            eprintln!("  Set one of these environment variables:");
            eprintln!("    STEWARD_API_KEY=sk-...   (preferred)");
            eprintln!("    OPENAI_API_KEY=sk-...");
            eprintln!();
            eprintln!("  Or add it to your config file:");
            eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
            eprintln!();
            return Err("No usable provider. See above for setup instructions.".into());
        }
    };

    let registry = Arc::new(steward_functions::default_registry());
    let channel = Arc::new(CliChannel::new());
    info!(provider = %config.provider, model = %config.model, functions = registry.len(), "Agent starting");
    let router = SessionRouter::from_config(&config, provider, registry.clone(), channel.clone());

    if let Some(msg) = message {
        // Single message mode
        router
            .handle(InboundMessage::text(CLI_USER_ID, CLI_CHAT_ID, msg, "1"))
            .await;
        channel.wait_turn_end().await;
    } else {
        // Interactive mode
        println!();
        println!("  Steward: interactive mode");
        println!();
        println!("  Provider:  {}", config.provider);
        println!("  Model:     {}", config.model);
        println!("  Functions: {}", registry.names().join(", "));
        match &config.history.dir {
            Some(dir) => println!("  History:   {}", dir.display()),
            None => println!("  History:   not persisted"),
        }
        println!();
        println!("  Type your message and press Enter.");
        println!("  Commands: /clear, /tz <hours>, /image <path>");
        println!("  Type 'exit' or Ctrl+D to quit.");
        println!();

        let mut rx = channel.start();
        prompt()?;

        while let Some(inbound) = rx.recv().await {
            let is_turn = inbound.kind == InboundKind::Text;
            router.handle(inbound).await;
            if is_turn {
                channel.wait_turn_end().await;
                println!();
            }
            prompt()?;
        }

        println!();
        println!("  Goodbye!");
        println!();
    }

    router.shutdown().await;
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
