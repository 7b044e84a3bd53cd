//! `parley chat`: a single terminal session against the configured model.
//!
//! Lines go through the same chat call the HTTP gateway uses, so
//! `bot-context` commands and the response cache behave identically.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parley_agent::{ChatError, ChatService};
use parley_core::event::EventBus;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    session: Option<String>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    let router = parley_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| format!("No provider registered for '{}'", config.provider))?;
    let chat = Arc::new(ChatService::from_config(&config, provider, Arc::new(EventBus::default())));
    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    if let Some(msg) = message {
        match chat.handle(&session_id, &msg, false).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => return Err(e.to_string().into()),
        }
        return Ok(());
    }

    println!();
    println!("  parley interactive chat");
    println!("  Provider:  {}", config.provider);
    println!("  Model:     {}", config.model);
    println!("  Session:   {session_id}");
    println!();
    println!("  Type 'help' for commands, 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if matches!(line, "exit" | "quit") {
            break;
        }

        match chat.handle(&session_id, line, false).await {
            Ok(reply) => {
                println!();
                for l in reply.lines() {
                    println!("  Assistant > {l}");
                }
                println!();
            }
            Err(ChatError::EmptyMessage) => {}
            Err(e) => eprintln!("  [Error] {e}"),
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
