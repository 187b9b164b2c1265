use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use kvwarden::{
    Client, ConnectionConfig, Entity, ErrorCode, InMemoryTransport, JsonRepository,
    KeyValueTransport, PersistenceConfig,
};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kvwarden")]
#[command(about = "Developer tooling for versioned entities and persistence policies")]
struct Cli {
    /// Connection URL; falls back to REDIS_URL, then redis://localhost:6379
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Save an entity, update it, remove it and confirm the key space is empty
    Entity {
        #[arg(long, default_value = "entities")]
        schema: String,
        /// Field as name=value; values are read as JSON when they parse
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
        #[arg(long, default_value_t = 1)]
        updates: u32,
    },
    /// Apply a persistence policy and print what the store now reports
    Persistence {
        #[arg(long, conflicts_with = "policy_file")]
        policy: Option<String>,
        #[arg(long)]
        policy_file: Option<PathBuf>,
    },
    /// Print the error code table
    Errors,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = connection_config(cli.url.as_deref())?;

    match cli.command {
        Command::Entity {
            schema,
            fields,
            updates,
        } => run_entity(&config, &schema, &fields, updates).await,
        Command::Persistence {
            policy,
            policy_file,
        } => run_persistence(&config, policy.as_deref(), policy_file).await,
        Command::Errors => {
            for code in ErrorCode::ALL {
                println!("{:<30} {}", code.as_str(), code.status());
            }
            Ok(())
        }
    }
}

fn connection_config(url: Option<&str>) -> Result<ConnectionConfig> {
    let config = match url {
        Some(url) => ConnectionConfig::new(url)?,
        None => match ConnectionConfig::from_env() {
            Ok(config) => config,
            Err(_) => ConnectionConfig::new("redis://localhost:6379")?,
        },
    };
    Ok(config)
}

fn client(config: &ConnectionConfig, schema: &str) -> Client {
    let transport: Arc<dyn KeyValueTransport> = Arc::new(InMemoryTransport::from_config(config));
    let repository = Arc::new(JsonRepository::new(transport.clone(), schema));
    Client::new(transport, repository)
}

async fn run_entity(config: &ConnectionConfig, schema: &str, fields: &[String], updates: u32) -> Result<()> {
    let client = client(config, schema);
    let manager = client.transactions();

    let mut entity = Entity::new();
    for field in fields {
        let (name, value) = parse_field(field)?;
        entity.set_field(&name, value);
    }

    let mut saved = manager.save(entity).await?;
    let entity_id = saved
        .entity_id()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("saved entity has no id"))?;
    println!("saved {} version {}", entity_id, saved.version());

    for _ in 0..updates {
        saved = manager.save(saved).await?;
        println!("saved {} version {}", entity_id, saved.version());
    }

    let fetched = manager.fetch(&entity_id).await?;
    println!("{}", serde_json::to_string_pretty(&fetched)?);

    manager.remove(&entity_id).await?;
    let residual = client.transport().keys(&manager.key_pattern(&entity_id)).await?;
    println!("removed {} ({} keys left)", entity_id, residual.len());

    client.disconnect().await?;
    Ok(())
}

async fn run_persistence(
    config: &ConnectionConfig,
    policy: Option<&str>,
    policy_file: Option<PathBuf>,
) -> Result<()> {
    let document = match (policy, policy_file) {
        (Some(json), _) => PersistenceConfig::from_json(json)?,
        (None, Some(path)) => PersistenceConfig::from_file(&path)
            .await
            .with_context(|| format!("Failed to load policy from '{}'", path.display()))?,
        (None, None) => return Err(anyhow!("Provide --policy <json> or --policy-file <path>")),
    };

    let client = client(config, "entities");
    let controller = client.persistence();

    controller.set_persistence(&document).await?;
    let current = controller.get_current_config().await?;
    let status = controller.check_persistence_status().await?;

    println!("{}", serde_json::to_string_pretty(&current)?);
    println!("{}", serde_json::to_string_pretty(&status)?);

    client.disconnect().await?;
    Ok(())
}

fn parse_field(input: &str) -> Result<(String, JsonValue)> {
    let (name, raw) = input
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid field '{}'. Expected format: name=value", input))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Field name cannot be empty in '{}'", input));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()));
    Ok((name.to_string(), value))
}
