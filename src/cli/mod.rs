use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agentflow", version, about = "Declarative agent pipeline runner")]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "AGENTFLOW_LOG_JSON")]
    pub log_json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute an agent definition.
    Run(RunOpts),
    /// Manage the local secret store.
    Secrets(SecretsOpts),
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args)]
pub struct RunOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    /// Agent definition file (JSON, JSON5, YAML or TOML).
    pub agent: PathBuf,
    /// Run input as inline JSON.
    #[arg(short, long, conflicts_with = "input_file")]
    pub input: Option<String>,
    /// Read run input from a JSON file.
    #[arg(long)]
    pub input_file: Option<PathBuf>,
    /// Print the full execution report instead of the output only.
    #[arg(long)]
    pub report: bool,
}

impl RunOpts {
    /// Parsed run input. Defaults to an empty object.
    pub fn input_value(&self) -> Result<Value> {
        if let Some(raw) = &self.input {
            return serde_json::from_str(raw).context("--input is not valid JSON");
        }
        if let Some(path) = &self.input_file {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read input file '{}'", path.display()))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("input file '{}' is not valid JSON", path.display()));
        }
        Ok(Value::Object(Default::default()))
    }
}

#[derive(clap::Args)]
pub struct SecretsOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: SecretsAction,
}

#[derive(Subcommand)]
pub enum SecretsAction {
    /// Resolve an agent's declared secrets and report missing ones.
    Validate { agent: PathBuf },
    /// Store a secret under an alias.
    Set { alias: String, value: String },
    /// Delete a stored secret.
    Remove { alias: String },
    /// List stored aliases with redacted values.
    List,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
    Init,
}
