//! SQLPG CLI - run the assistant's actions on a local script
//!
//! Usage:
//!   sqlpg <FILE.sql> [--action <ACTION>]... [--config <PATH>] [--html]
//!
//! Example:
//!   sqlpg schema.sql --action convert --action verify
//!   sqlpg schema.sql --action all -v

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use sqlpg::controller::OutcomeStatus;
use sqlpg::provider::{CompletionClient, OpenAiProvider};
use sqlpg::{credential, Action, Assistant, AssistantConfig, Session};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "sqlpg", version, about = "Summarize, diagram and convert SQL Server scripts to PostgreSQL")]
struct Cli {
    /// SQL Server script to analyze (must end in .sql)
    file: PathBuf,

    /// Actions to run in order: overview, diagram, convert, verify, all
    #[arg(short, long = "action", default_value = "overview")]
    actions: Vec<String>,

    /// Config file (same format as the server's)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Print rendered HTML instead of the model's text
    #[arg(long)]
    html: bool,

    /// Log requests to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn expand_actions(requested: &[String]) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    for name in requested {
        if name.eq_ignore_ascii_case("all") {
            actions.extend(Action::ALL);
        } else {
            actions.push(name.parse::<Action>().map_err(anyhow::Error::msg)?);
        }
    }
    // Verify needs a conversion earlier in the same run
    if let Some(pos) = actions.iter().position(|a| *a == Action::Verify) {
        if !actions[..pos].contains(&Action::Convert) {
            actions.insert(pos, Action::Convert);
        }
    }
    Ok(actions)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let actions = expand_actions(&cli.actions)?;
    let config = AssistantConfig::load(&cli.config)?;

    let bytes = std::fs::read(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let file_name = cli
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let credential = credential::resolve(&config.token_url).await;
    if !credential.is_present() {
        eprintln!(
            "{} no credential; set {} or check the token endpoint",
            "warning:".yellow().bold(),
            credential::API_KEY_ENV
        );
    }

    let provider = OpenAiProvider::new(
        &config.completion_url,
        credential,
        &config.model,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let client = CompletionClient::new(Arc::new(provider), config.max_tokens, config.temperature);
    let assistant = Assistant::new(client, config.sample_path.clone());
    let session = Session::new();

    assistant.load_script(&session, &file_name, &bytes)?;
    eprintln!("{} {} ({} bytes)", "Loaded".green().bold(), file_name, bytes.len());

    let mut failures = 0;
    for action in actions {
        eprintln!("{}", action.placeholder().dimmed());
        let outcome = assistant.run(&session, action).await?;

        let heading = format!("=== {} ===", action.as_str().to_uppercase());
        match outcome.status {
            OutcomeStatus::Rendered => println!("{}", heading.cyan().bold()),
            OutcomeStatus::Failed => {
                failures += 1;
                println!("{}", heading.red().bold());
            }
        }
        if let Some(warning) = &outcome.warning {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }

        if cli.html {
            println!("{}", outcome.html);
            continue;
        }

        println!("{}\n", outcome.text);
    }

    if failures > 0 {
        bail!("{} action(s) failed", failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_expands_in_order() {
        assert_eq!(expand_actions(&names(&["all"])).unwrap(), Action::ALL.to_vec());
    }

    #[test]
    fn test_verify_gets_a_conversion_first() {
        assert_eq!(
            expand_actions(&names(&["verify", "convert"])).unwrap(),
            vec![Action::Convert, Action::Verify, Action::Convert]
        );
        assert_eq!(
            expand_actions(&names(&["erd", "verify"])).unwrap(),
            vec![Action::Diagram, Action::Convert, Action::Verify]
        );
    }

    #[test]
    fn test_unknown_action() {
        assert!(expand_actions(&names(&["translate"])).is_err());
    }
}
