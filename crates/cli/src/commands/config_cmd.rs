//! `parley config`: inspect configuration.

use std::path::Path;

use parley_config::AppConfig;

use super::load_config;
use crate::ConfigAction;

pub fn run(config_path: Option<&Path>, action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Default => print!("{}", AppConfig::default_toml()),
        ConfigAction::Show => {
            let config = redacted(load_config(config_path)?);
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            let path = config_path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn redacted(mut config: AppConfig) -> AppConfig {
    const MASK: &str = "[REDACTED]";
    if config.api_key.is_some() {
        config.api_key = Some(MASK.into());
    }
    if config.gateway.session_secret.is_some() {
        config.gateway.session_secret = Some(MASK.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(MASK.into());
        }
    }
    config
}
