//! Thin CLI over the engine. Requires the `semantic` feature for the
//! bundled embedder; the library itself only consumes the trait.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codescope::embed::fastembed_impl::FastEmbedder;
use codescope::{
    DiffOptions, Engine, EngineConfig, ImpactOptions, SearchOptions, SimilarTarget,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "codescope", version, about = "Branch-aware semantic code intelligence")]
struct Cli {
    /// Workspace root.
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Branch partition to operate on.
    #[arg(long, default_value = "main", global = true)]
    branch: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Incrementally index the workspace.
    Index,
    /// Drop the branch partition and index from scratch.
    Rebuild,
    /// Show index statistics.
    Status,
    /// Hybrid search over the indexed workspace.
    Search {
        query: String,
        #[arg(long)]
        max_tokens: Option<usize>,
        #[arg(long)]
        depth: Option<u32>,
    },
    /// Find code similar to a snippet.
    Similar {
        code: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Who transitively calls this symbol.
    Impact {
        symbol_id: String,
        #[arg(long, default_value_t = 10)]
        depth: u32,
    },
    /// Symbol-level diff between two branches.
    Diff {
        source_branch: String,
        target_branch: String,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::new(&cli.root).with_branch(&cli.branch);
    let embedder = Arc::new(FastEmbedder::all_mini_lm().context("failed to load embedder")?);
    let engine = Engine::new(config, embedder, None)?;

    match cli.command {
        Command::Index => {
            let report = engine.update().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Rebuild => {
            let report = engine.rebuild().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Status => {
            let status = engine.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Search {
            query,
            max_tokens,
            depth,
        } => {
            let options = SearchOptions {
                max_tokens,
                graph_depth: depth,
                ..Default::default()
            };
            let result = engine.search_text(&query, options).await?;
            println!("{}", serde_json::to_string_pretty(&result.metadata)?);
            println!("{}", result.context);
        }
        Command::Similar { code, limit } => {
            let hits = engine
                .find_similar(&SimilarTarget::Code(code), limit, None)
                .await?;
            for hit in hits {
                println!(
                    "{:.3}  {}  {}:{}",
                    hit.similarity,
                    hit.symbol.qualified_name,
                    hit.symbol.file_path,
                    hit.symbol.start_line
                );
            }
        }
        Command::Impact { symbol_id, depth } => {
            let options = ImpactOptions {
                branch: cli.branch.clone(),
                max_depth: depth,
                ..Default::default()
            };
            match engine.impact(&symbol_id, Some(options)).await? {
                Some(analysis) => println!("{}", serde_json::to_string_pretty(&analysis)?),
                None => eprintln!("symbol {symbol_id} not found"),
            }
        }
        Command::Diff {
            source_branch,
            target_branch,
            limit,
        } => {
            let options = DiffOptions { offset: 0, limit };
            let result = engine
                .diff(&source_branch, &target_branch, Some(options))
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
