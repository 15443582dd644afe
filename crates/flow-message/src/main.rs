//! Flow message CLI
//!
//! Renders, enumerates and compares message content from files, applying
//! masks from a YAML configuration.
//!
//! Usage:
//!   flow-message render --codec json message.json
//!   flow-message diff --codec http-response --masks masks.yaml expected.txt actual.txt

use anyhow::Context;
use clap::{Parser, Subcommand};
use flow_message::{CodecKind, ConfiguredSource, MaskConfig, Message, Unpredictable};
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser, Debug)]
#[command(name = "flow-message")]
#[command(author, version, about = "Render and compare test flow messages")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args, Debug)]
struct Masking {
    /// YAML mask configuration
    #[arg(short, long)]
    masks: Option<PathBuf>,

    /// Unpredictable source to mask. Defaults to every configured source
    #[arg(short, long = "unpredictable")]
    unpredictable: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the human-readable form of a message
    Render {
        #[arg(short, long)]
        codec: CodecKind,

        #[command(flatten)]
        masking: Masking,

        file: PathBuf,
    },

    /// List the addressable fields of a message
    Fields {
        #[arg(short, long)]
        codec: CodecKind,

        file: PathBuf,
    },

    /// Compare two messages after masking. Exits with status 1 on difference
    Diff {
        #[arg(short, long)]
        codec: CodecKind,

        #[command(flatten)]
        masking: Masking,

        expected: PathBuf,

        actual: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command) {
        Ok(same) => std::process::exit(if same { 0 } else { 1 }),
        Err(e) => {
            eprintln!("{RED}{BOLD}Error:{RESET} {e:#}");
            std::process::exit(2);
        }
    }
}

/// Returns `false` when a comparison found a difference.
fn run(command: Command) -> anyhow::Result<bool> {
    match command {
        Command::Render {
            codec,
            masking,
            file,
        } => {
            let mut msg = load(codec, &file)?;
            let sources = masking.install(msg.as_mut())?;
            println!("{}", assertable(msg.as_ref(), &sources)?);
            Ok(true)
        }
        Command::Fields { codec, file } => {
            let msg = load(codec, &file)?;
            for field in msg.fields()? {
                println!("{field}");
            }
            Ok(true)
        }
        Command::Diff {
            codec,
            masking,
            expected,
            actual,
        } => {
            let mut expected_msg = load(codec, &expected)?;
            let sources = masking.install(expected_msg.as_mut())?;
            let actual_bytes = read(&actual)?;
            let actual_msg = expected_msg.peer_message(&actual_bytes)?;

            let expected_text = assertable(expected_msg.as_ref(), &sources)?;
            let actual_text = assertable(actual_msg.as_ref(), &sources)?;
            if expected_text == actual_text {
                println!("{GREEN}{BOLD}✓{RESET} Messages match");
                return Ok(true);
            }
            print_diff(&expected, &actual, &expected_text, &actual_text);
            Ok(false)
        }
    }
}

impl Masking {
    /// Installs the configured masks on `msg` and returns the sources to apply.
    fn install(&self, msg: &mut dyn Message) -> anyhow::Result<Vec<ConfiguredSource>> {
        let Some(path) = &self.masks else {
            return Ok(self
                .unpredictable
                .iter()
                .cloned()
                .map(ConfiguredSource)
                .collect());
        };
        let config = MaskConfig::from_file(path)
            .with_context(|| format!("Failed to load masks from {}", path.display()))?;
        config.install(msg)?;
        if self.unpredictable.is_empty() {
            return Ok(config.sources());
        }
        for name in &self.unpredictable {
            if !config.masks.contains_key(name) {
                anyhow::bail!("No masks configured for '{name}'");
            }
        }
        Ok(self
            .unpredictable
            .iter()
            .cloned()
            .map(ConfiguredSource)
            .collect())
    }
}

fn read(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load(codec: CodecKind, path: &Path) -> anyhow::Result<Box<dyn Message>> {
    let bytes = read(path)?;
    codec
        .parse(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn assertable(msg: &dyn Message, sources: &[ConfiguredSource]) -> anyhow::Result<String> {
    let sources: Vec<&dyn Unpredictable> = sources.iter().map(|s| s as &dyn Unpredictable).collect();
    Ok(msg.assertable(&sources)?)
}

fn print_diff(expected: &Path, actual: &Path, expected_text: &str, actual_text: &str) {
    println!("{RED}--- {}{RESET}", expected.display());
    println!("{GREEN}+++ {}{RESET}", actual.display());

    let diff = TextDiff::from_lines(expected_text, actual_text);
    for group in diff.grouped_ops(3) {
        if let (Some(first), Some(last)) = (group.first(), group.last()) {
            let old = first.old_range().start..last.old_range().end;
            let new = first.new_range().start..last.new_range().end;
            println!(
                "{CYAN}@@ -{},{} +{},{} @@{RESET}",
                old.start + 1,
                old.len(),
                new.start + 1,
                new.len()
            );
        }
        for op in &group {
            for change in diff.iter_changes(op) {
                let (sign, color) = match change.tag() {
                    ChangeTag::Delete => ("-", RED),
                    ChangeTag::Insert => ("+", GREEN),
                    ChangeTag::Equal => (" ", DIM),
                };
                print!("{color}{sign}{}{RESET}", change.value());
                if change.missing_newline() {
                    println!();
                }
            }
        }
    }
}
