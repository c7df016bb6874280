use clap::{Args, ValueEnum};

use brainsync::config::Config;

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Show effective configuration values and where they came from
#[derive(Args)]
pub struct ConfigCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
            OutputFormat::Text => {
                println!("Configuration");
                println!("=============\n");

                if let Some(path) = &config.config_file {
                    println!("Config file: {}", path.display());
                } else {
                    println!(
                        "Config file: {} (not found)",
                        Config::default_config_path().display()
                    );
                }
                println!();

                println!("database_path: {}", config.database_path.value.display());
                println!("  source: {}", config.database_path.source);
                println!();

                println!(
                    "sync.server_url: {}",
                    config.sync.server_url.as_deref().unwrap_or("(not set)")
                );
                println!(
                    "sync.api_key: {}",
                    if config.sync.api_key.is_some() {
                        "(set)"
                    } else {
                        "(not set)"
                    }
                );
                println!("sync.push_attempts: {}", config.sync.push_attempts);
                println!("sync.retry_backoff_ms: {}", config.sync.retry_backoff_ms);
                println!(
                    "sync.request_timeout_ms: {}",
                    config.sync.request_timeout_ms
                );
            }
        }
        Ok(())
    }
}
