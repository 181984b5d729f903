use agentflow::agent::AgentDefinition;
use agentflow::cli::{Cli, Commands, ConfigAction, SecretsAction};
use agentflow::config::{validate_config, EngineConfig};
use agentflow::engine::Engine;
use agentflow::env::{process_env, SharedEnv};
use agentflow::logging;
use agentflow::secrets::{redact_secret, validate_secrets, LocalSecretStore, StoreKey};
use anyhow::bail;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(cli.log_json);
    let env: SharedEnv = process_env();

    match cli.command {
        Commands::Run(opts) => {
            let config = EngineConfig::load(opts.config.as_deref(), env.as_ref())?;
            let agent = AgentDefinition::from_path(&opts.agent)?;
            let input = opts.input_value()?;
            info!("Running agent '{}'", agent.id);

            let engine = Engine::from_config(&config, env)?;
            let report = engine.execute_with_report(&agent, input).await?;
            if opts.report {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&report.output)?);
            }
        }
        Commands::Secrets(opts) => {
            let config = EngineConfig::load(opts.config.as_deref(), env.as_ref())?;
            match opts.action {
                SecretsAction::Validate { agent } => {
                    let agent = AgentDefinition::from_path(&agent)?;
                    let engine = Engine::from_config(&config, env)?;
                    let resolved = engine
                        .secrets()
                        .resolve_secrets(&agent.secret_declarations)
                        .await;
                    let validation = validate_secrets(&resolved);
                    println!("{}", serde_json::to_string_pretty(&validation)?);
                    if !validation.valid {
                        bail!("{} secret(s) unresolved", validation.missing.len());
                    }
                }
                SecretsAction::Set { alias, value } => {
                    let store = open_store(&config, &env)?;
                    store.store_secret(&alias, &value).await?;
                    info!("Stored secret '{}' in {}", alias, store.path().display());
                }
                SecretsAction::Remove { alias } => {
                    let store = open_store(&config, &env)?;
                    if store.remove_secret(&alias).await? {
                        info!("Removed secret '{alias}'");
                    } else {
                        bail!("No secret stored under '{alias}'");
                    }
                }
                SecretsAction::List => {
                    let store = open_store(&config, &env)?;
                    let mut secrets: Vec<_> = store.load_secrets().await.into_iter().collect();
                    secrets.sort();
                    for (alias, value) in secrets {
                        println!("{alias}\t{}", redact_secret(&value));
                    }
                }
            }
        }
        Commands::Config(opts) => match opts.action {
            ConfigAction::Show => {
                let config = EngineConfig::load(opts.config.as_deref(), env.as_ref())?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Validate => {
                let config = EngineConfig::load(opts.config.as_deref(), env.as_ref())?;
                let errors = validate_config(&config);
                if errors.is_empty() {
                    info!("Configuration is valid");
                } else {
                    for err in &errors {
                        error!("{err}");
                    }
                    bail!("{} configuration error(s)", errors.len());
                }
            }
            ConfigAction::Init => {
                EngineConfig::write_default(opts.config.as_deref().unwrap_or("agentflow.json"))?;
                info!("Configuration file created");
            }
        },
        Commands::Version => {
            println!("agentflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Open the local store. Management commands need a persistent key.
fn open_store(config: &EngineConfig, env: &SharedEnv) -> anyhow::Result<LocalSecretStore> {
    let key = StoreKey::from_env(env.as_ref(), &config.secrets.key_env);
    if key.is_ephemeral() {
        bail!("{} must be set to manage stored secrets", config.secrets.key_env);
    }
    Ok(LocalSecretStore::new(config.secrets_store_path(env.as_ref()), key))
}
