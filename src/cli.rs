//! Command-line interface.

use crate::aidb::AnimeDb;
use crate::config::Config;
use crate::models::{MediaType, ParsedId};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "streamarr", version, about = "Stream aggregation service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the API server and the anime-database refresh timers
    Daemon,

    /// Resolve a content id against the anime database and print the entry
    Resolve {
        /// e.g. `tt2560140:2:5`, `kitsu:7936:5`, `mal:16498`
        id: String,

        #[arg(long)]
        season: Option<u32>,

        #[arg(long)]
        episode: Option<u32>,
    },

    /// Refresh anime-database corpora and exit
    Refresh {
        /// Refresh a single source by name (e.g. `anime-list`)
        #[arg(long)]
        source: Option<String>,
    },

    /// Create a default config file
    Init,
}

pub async fn cmd_resolve(
    config: &Config,
    id: &str,
    season: Option<u32>,
    episode: Option<u32>,
) -> Result<()> {
    let db = AnimeDb::new(config.anime_db_config());
    db.init().await?;

    let parsed = ParsedId::parse(id, MediaType::Unknown)
        .with_context(|| format!("unrecognized id `{id}`"))?;
    let season = season.or(parsed.season);
    let episode = episode.or(parsed.episode);

    match db.get_entry_by_id(parsed.source, &parsed.value, season, episode) {
        Some(entry) => println!("{entry:#?}"),
        None => println!("No database entry for {id}"),
    }

    db.shutdown();
    Ok(())
}

pub async fn cmd_refresh(config: &Config, source: Option<&str>) -> Result<()> {
    let mut db_config = config.anime_db_config();
    if let Some(name) = source {
        db_config.sources.retain(|s| s.corpus.name() == name);
        if db_config.sources.is_empty() {
            anyhow::bail!("unknown source `{name}`");
        }
    }

    let db = AnimeDb::new(db_config);
    db.init().await?;
    db.shutdown();
    println!("✓ Refresh complete");
    Ok(())
}
