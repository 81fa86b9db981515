//! `layouts` command-line tool.
//!
//! Applies migrations, runs the layout resolver against a described
//! request, and drives layout and rule lifecycle transitions.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use layouts_core::cms::StaticItemLoader;
use layouts_core::resolver::RequestContext;
use layouts_core::types::DbId;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layouts_engine::config::EngineConfig;
use layouts_engine::{Engine, Registries};

#[derive(Parser)]
#[command(name = "layouts")]
#[command(about = "Layout storage and resolution tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,

    /// Resolve the layout for a request
    Resolve {
        /// Route name
        #[arg(long)]
        route: Option<String>,

        /// Path info
        #[arg(long)]
        path: Option<String>,

        /// Request URI, query string included
        #[arg(long)]
        uri: Option<String>,

        /// Route parameter, repeatable
        #[arg(long = "route-param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        route_params: Vec<(String, String)>,

        /// Query parameter, repeatable
        #[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        query_params: Vec<(String, String)>,

        /// Error status code of the response
        #[arg(long)]
        status_code: Option<u16>,
    },

    /// Publish the draft of a layout
    PublishLayout { id: DbId },

    /// Discard the draft of a layout
    DiscardLayout { id: DbId },

    /// Restore the archived copy of a layout as its draft
    RestoreLayout { id: DbId },

    /// Publish the draft of a rule
    PublishRule { id: DbId },

    /// Enable a published rule
    EnableRule { id: DbId },

    /// Disable a published rule
    DisableRule { id: DbId },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got \"{raw}\"")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layouts_engine=info,layouts_db=info,layouts_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // --- Configuration ---
    let mut config = EngineConfig::from_env().context("Invalid configuration")?;
    if matches!(cli.command, Commands::Migrate) {
        config.run_migrations = true;
    }
    tracing::info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Loaded engine configuration"
    );

    // --- Engine ---
    let registries = Registries::new(Arc::new(StaticItemLoader::new()));
    let engine = Engine::connect(&config, registries)
        .await
        .context("Failed to open the layouts database")?;

    match cli.command {
        Commands::Migrate => println!("migrations applied"),
        Commands::Resolve {
            route,
            path,
            uri,
            route_params,
            query_params,
            status_code,
        } => {
            let mut request = RequestContext::new();
            if let Some(route) = &route {
                request = request.with_route(route);
            }
            if let Some(path) = &path {
                request = request.with_path_info(path);
            }
            if let Some(uri) = &uri {
                request = request.with_request_uri(uri);
            }
            for (name, value) in &route_params {
                request = request.with_route_param(name, value);
            }
            for (name, value) in &query_params {
                request = request.with_query_param(name, value);
            }
            if let Some(code) = status_code {
                request = request.with_status_code(code);
            }

            match engine.resolver().resolve_layout(&request).await? {
                Some(rule) => match rule.layout_id {
                    Some(layout_id) => println!("rule {} -> layout {layout_id}", rule.id),
                    None => println!("rule {} -> no layout", rule.id),
                },
                None => println!("no match"),
            }
        }
        Commands::PublishLayout { id } => {
            let layout = engine.layouts().publish_layout(id).await?;
            println!("layout {} published ({})", layout.id, layout.name);
        }
        Commands::DiscardLayout { id } => {
            engine.layouts().discard_draft(id).await?;
            println!("layout {id} draft discarded");
        }
        Commands::RestoreLayout { id } => {
            let layout = engine.layouts().restore_from_archive(id).await?;
            println!("layout {} restored ({})", layout.id, layout.name);
        }
        Commands::PublishRule { id } => {
            let rule = engine.rules().publish_rule(id).await?;
            let state = if rule.enabled { "enabled" } else { "disabled" };
            println!("rule {} published ({state})", rule.id);
        }
        Commands::EnableRule { id } => {
            engine.rules().enable_rule(id).await?;
            println!("rule {id} enabled");
        }
        Commands::DisableRule { id } => {
            engine.rules().disable_rule(id).await?;
            println!("rule {id} disabled");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_pairs() {
        assert_eq!(
            parse_key_value("id=42").unwrap(),
            ("id".to_string(), "42".to_string())
        );
        assert_eq!(
            parse_key_value("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
