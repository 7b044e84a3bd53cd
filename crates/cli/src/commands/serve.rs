//! `parley serve`: start the HTTP chat server.

use std::path::Path;

use super::load_config;

pub async fn run(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    println!("parley gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.provider, config.model);
    println!("   Contexts:  {}", config.chat.contexts_dir.display());

    parley_gateway::start(config).await
}
