//! Sync CLI commands for talking to the table server.

use clap::Args;

use brainsync::config::Config;
use brainsync::models::StoreName;
use brainsync::remote::{check_server, RestRemote};
use brainsync::sync::{PullOutcome, PullReport};
use brainsync::Persistence;

/// Sign in and pull every store from the server
#[derive(Debug, Args)]
pub struct PullCommand {}

impl PullCommand {
    pub async fn run(
        &self,
        persistence: &Persistence,
        remote: Option<&RestRemote>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let remote = remote.ok_or("sync is not configured (or --offline was given)")?;
        let user_id = remote.whoami().await?;

        println!("Pulling as {}...", user_id);
        println!();

        match persistence.set_auth(Some(&user_id)).await {
            Some(report) => print_report(&report),
            None => println!("Already up to date."),
        }
        Ok(())
    }
}

fn print_report(report: &PullReport) {
    for outcome in &report.outcomes {
        match outcome {
            PullOutcome::Pulled { store, count } => {
                println!(
                    "  ✓ {} ({} record{})",
                    store,
                    count,
                    if *count == 1 { "" } else { "s" }
                )
            }
            PullOutcome::Failed { store, reason } => {
                println!("  ✗ {} (kept local data: {})", store, reason)
            }
        }
    }
    println!();
    if report.is_complete() {
        println!("Pull complete.");
    } else {
        println!(
            "Pull finished with {} failed store(s).",
            report.failures().count()
        );
    }
}

/// Show sync configuration, server status and local store contents
#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn run(
        &self,
        persistence: &Persistence,
        config: &Config,
        remote: Option<&RestRemote>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        match (&config.sync.server_url, &config.sync.api_key) {
            (Some(server_url), Some(api_key)) => {
                println!("Server:    {}", server_url);
                println!("API Key:   {}...", api_key.chars().take(8).collect::<String>());
                println!("Attempts:  {}", config.sync.push_attempts);
                println!();

                match remote {
                    Some(remote) => {
                        print!("Server status: ");
                        if !check_server(remote.base_url()).await {
                            println!("✗ unreachable");
                        } else {
                            match remote.whoami().await {
                                Ok(user_id) => println!("✓ connected as {}", user_id),
                                Err(e) => println!("✗ error: {}", e),
                            }
                        }
                    }
                    None => println!("Server status: not checked (--offline)"),
                }
            }
            _ => {
                println!("Status: Not configured");
                println!();
                println!("To enable sync, add to your config file:");
                println!();
                println!("  sync:");
                println!("    server_url: \"http://localhost:8787\"");
                println!("    api_key: \"your-api-key\"");
                println!();
                println!("Or set environment variables:");
                println!("  BRAINSYNC_SYNC_URL");
                println!("  BRAINSYNC_SYNC_API_KEY");
            }
        }

        println!();
        println!("Local Store");
        println!("===========");
        println!();
        let local = persistence.local();
        println!("Database:       {}", local.path().display());
        println!("Schema version: {}", local.schema_version().await?);
        for store in StoreName::ALL {
            println!("  {:<14} {}", store.as_str(), local.count(store).await?);
        }

        Ok(())
    }
}
