//! DebateArena CLI - persona debates from the command line
//!
//! Acts as the caller of the core engine: it owns the transcript file and
//! the account store, and renders turns to the console.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use debatearena_core::persona;
use debatearena_core::{
    AccountStore, Config, DebateCallback, DebateConfig, DebateEvent, DebateOrchestrator,
    DebateOutcome, JsonFileAccountStore, OpenAiGenerator, PersonaReference, Speaker, TokenAccount,
    Turn,
};
use tracing::info;

/// Exit code used when the account has no tokens left.
const EXIT_QUOTA_EXHAUSTED: i32 = 2;

#[derive(Parser)]
#[command(
    name = "debatearena",
    version,
    about = "Persona debates powered by a text-generation service",
    long_about = "Run turn-by-turn debates between built-in or custom personas using an \
                  OpenAI-compatible API, with a daily token quota per account."
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON file holding account token usage
    #[arg(long, global = true, default_value = "accounts.json", value_name = "FILE")]
    accounts: PathBuf,

    /// Account to charge
    #[arg(long, global = true, default_value = "local", value_name = "ID")]
    account: String,

    /// Print machine-readable JSON instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a debate: generate the opening turn of each side
    Start {
        /// The topic to debate
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// First debater: catalog key, JSON persona object, or a name
        #[arg(long, value_name = "PERSONA")]
        profile1: String,

        /// Second debater: catalog key, JSON persona object, or a name
        #[arg(long, value_name = "PERSONA")]
        profile2: String,

        /// Write the opening transcript to this file
        #[arg(long, value_name = "FILE")]
        transcript: Option<PathBuf>,
    },
    /// Continue a debate from a saved transcript
    Continue {
        /// The topic to debate
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// First debater: catalog key, JSON persona object, or a name
        #[arg(long, value_name = "PERSONA")]
        profile1: String,

        /// Second debater: catalog key, JSON persona object, or a name
        #[arg(long, value_name = "PERSONA")]
        profile2: String,

        /// Transcript file (JSON array of turns)
        #[arg(long, value_name = "FILE")]
        transcript: PathBuf,

        /// Number of turns to generate, one after another
        #[arg(short, long, default_value = "1", value_name = "TURNS")]
        turns: u32,

        /// Append the new turns to the transcript file
        #[arg(long)]
        save: bool,
    },
    /// List the built-in personas
    Presets,
    /// Show token usage for the account
    Usage,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Ok(model) = env::var("DEBATEARENA_MODEL") {
        config.generation.model = model;
    }

    let accounts = Arc::new(JsonFileAccountStore::new(
        &cli.accounts,
        config.quota.default_limit,
    ));

    match &cli.command {
        Command::Presets => {
            print_presets(cli.json)?;
            Ok(())
        }
        Command::Usage => {
            let account = accounts.snapshot(&cli.account, Utc::now()).await?;
            print_usage(&cli.account, &account, cli.json)?;
            Ok(())
        }
        Command::Start {
            topic,
            profile1,
            profile2,
            transcript,
        } => {
            let debate = debate_config(profile1, profile2, topic);
            let orchestrator = build_orchestrator(&config, accounts, cli.json)?;
            if !cli.json {
                print_header(&debate);
            }

            match orchestrator.start(&cli.account, &debate).await? {
                DebateOutcome::Completed(started) => {
                    if let Some(path) = transcript {
                        let turns = vec![started.turn0.to_turn(), started.turn1.to_turn()];
                        save_transcript(path, &turns)?;
                        info!(path = %path.display(), "Saved transcript");
                    }
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&started)?);
                    } else {
                        print_footer(started.total_tokens());
                    }
                    Ok(())
                }
                DebateOutcome::QuotaExhausted(account) => {
                    quota_exhausted(&account, cli.json, 0);
                    Ok(())
                }
            }
        }
        Command::Continue {
            topic,
            profile1,
            profile2,
            transcript,
            turns,
            save,
        } => {
            let debate = debate_config(profile1, profile2, topic);
            let mut history = load_transcript(transcript)?;
            let orchestrator = build_orchestrator(&config, accounts, cli.json)?;
            if !cli.json {
                print_header(&debate);
            }

            // One turn at a time: each call depends on the transcript length.
            let mut spent = 0;
            let mut generated = 0;
            for _ in 0..(*turns).max(1) {
                match orchestrator
                    .continue_debate(&cli.account, &debate, &history)
                    .await?
                {
                    DebateOutcome::Completed(next) => {
                        spent += next.turn.tokens;
                        generated += 1;
                        history.push(next.turn.to_turn());
                        if *save {
                            save_transcript(transcript, &history)?;
                        }
                        if cli.json {
                            println!("{}", serde_json::to_string(&next)?);
                        }
                    }
                    DebateOutcome::QuotaExhausted(account) => {
                        if !cli.json && generated > 0 {
                            print_footer(spent);
                        }
                        quota_exhausted(&account, cli.json, generated);
                        return Ok(());
                    }
                }
            }

            if !cli.json {
                print_footer(spent);
            }
            Ok(())
        }
    }
}

fn debate_config(profile1: &str, profile2: &str, topic: &str) -> DebateConfig {
    DebateConfig::new(
        PersonaReference::parse(profile1),
        PersonaReference::parse(profile2),
        topic.trim(),
    )
}

fn build_orchestrator(
    config: &Config,
    accounts: Arc<JsonFileAccountStore>,
    quiet: bool,
) -> Result<DebateOrchestrator, Box<dyn std::error::Error>> {
    // Get API configuration from environment
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
        String::new()
    });

    let generator = Arc::new(OpenAiGenerator::new(&api_base, &api_key, &config.generation)?);
    let orchestrator = DebateOrchestrator::new(config, generator, accounts);

    Ok(if quiet {
        orchestrator
    } else {
        orchestrator.with_callback(create_console_callback())
    })
}

fn load_transcript(path: &Path) -> Result<Vec<Turn>, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read transcript {}: {}", path.display(), e))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse transcript {}: {}", path.display(), e))?)
}

fn save_transcript(path: &Path, turns: &[Turn]) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, serde_json::to_string_pretty(turns)?)?;
    Ok(())
}

/// Exit code when the quota ran out after `generated` turns of this run.
/// Turns already produced make the run a partial success.
fn quota_exit_code(generated: u32) -> i32 {
    if generated == 0 {
        EXIT_QUOTA_EXHAUSTED
    } else {
        0
    }
}

/// Report the spent quota; exits the process unless some turns were made.
fn quota_exhausted(account: &TokenAccount, json: bool, generated: u32) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "error": "quota_exhausted",
                "used": account.used,
                "limit": account.limit,
                "generated": generated,
            })
        );
    } else if generated > 0 {
        eprintln!(
            "{} Stopped after {} turn(s): token limit reached ({}/{}). \
             Your quota resets tomorrow (UTC).",
            "Limit reached:".yellow().bold(),
            generated,
            account.used,
            account.limit
        );
    } else {
        eprintln!(
            "{} Token limit reached ({}/{}). Your quota resets tomorrow (UTC).",
            "Limit reached:".red().bold(),
            account.used,
            account.limit
        );
    }

    let code = quota_exit_code(generated);
    if code != 0 {
        std::process::exit(code);
    }
}

fn print_presets(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let presets: Vec<_> = persona::catalog()
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "key": entry.key,
                    "name": entry.name,
                    "avatar": entry.avatar,
                    "description": entry.description,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&presets)?);
        return Ok(());
    }

    println!("{}", "Built-in personas:".bold());
    for entry in persona::catalog() {
        println!(
            "  {} {} {}",
            entry.avatar,
            entry.key.bright_cyan(),
            format!("({})", entry.name).dimmed()
        );
        for line in textwrap(entry.description, 64).lines() {
            println!("      {}", line);
        }
    }
    Ok(())
}

fn print_usage(
    account_id: &str,
    account: &TokenAccount,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(account)?);
        return Ok(());
    }

    let remaining = format!("{} left", account.remaining());
    let remaining = if account.is_exhausted() {
        remaining.red().bold()
    } else if account.is_low() {
        remaining.yellow()
    } else {
        remaining.green()
    };
    println!(
        "{} {}: {}/{} tokens used ({}%), {}",
        "Account".bold(),
        account_id.bright_white(),
        account.used,
        account.limit,
        account.percent_used(),
        remaining
    );
    Ok(())
}

fn print_header(debate: &DebateConfig) {
    let profile1 = debate.profile1.resolve();
    let profile2 = debate.profile2.resolve();

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!(
            "  {} - {} vs {}",
            "DebateArena".bold(),
            profile1.name,
            profile2.name
        )
        .bright_blue()
        .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), debate.topic.bright_white());
    println!("{}", "─".repeat(70).dimmed());
    println!();
}

fn print_footer(tokens: u64) {
    println!("{}", "─".repeat(70).dimmed());
    println!("{}", format!("  {} tokens used", tokens).bright_green());
    println!();
}

/// Create a callback that prints debate events to the console.
fn create_console_callback() -> DebateCallback {
    Box::new(move |event| match event {
        DebateEvent::SpeakerStart { speaker, name } => {
            let name = match speaker {
                Speaker::Profile1 => name.bright_cyan().bold(),
                Speaker::Profile2 => name.bright_red().bold(),
            };
            println!("{} {}", "▶".bright_cyan(), name);
        }
        DebateEvent::SpeakerMessage {
            content, tokens, ..
        } => {
            // Word wrap and indent the content
            let wrapped = textwrap(&content, 66);
            for line in wrapped.lines() {
                println!("  {}", line);
            }
            println!("  {}", format!("{} tokens", tokens).dimmed());
            println!();
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textwrap_breaks_on_width() {
        assert_eq!(textwrap("one two three four", 9), "one two\nthree\nfour");
        assert_eq!(textwrap("", 10), "");
    }

    #[test]
    fn test_debate_config_from_args() {
        let debate = debate_config("elon_musk", "Grandma Jo", "  Pineapple on pizza ");
        assert_eq!(debate.profile1, PersonaReference::catalog("elon_musk"));
        assert_eq!(debate.profile2, PersonaReference::named("Grandma Jo"));
        assert_eq!(debate.topic, "Pineapple on pizza");
    }

    #[test]
    fn test_transcript_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        let turns = vec![
            Turn::new(Speaker::Profile1, "First point made"),
            Turn::new(Speaker::Profile2, "Second point made"),
        ];
        save_transcript(&path, &turns).unwrap();
        assert_eq!(load_transcript(&path).unwrap(), turns);

        fs::write(&path, "  \n").unwrap();
        assert!(load_transcript(&path).unwrap().is_empty());
    }

    #[test]
    fn test_quota_exit_code_keeps_partial_runs_successful() {
        assert_eq!(quota_exit_code(0), EXIT_QUOTA_EXHAUSTED);
        assert_eq!(quota_exit_code(2), 0);
    }
}
