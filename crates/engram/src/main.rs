// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engram - encrypted, context-scoped memory for conversational agents.
//!
//! This is the binary entry point for the Engram CLI.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use engram_core::{EngramError, RowErrorPolicy};
use engram_crypto::MemoryKey;
use engram_memory::{EmbeddingIndex, HashEmbedder, MemoryStore, DEFAULT_IMPORTANCE};
use engram_storage::Database;
use tracing::warn;

mod prompt;

/// Engram - encrypted memory store for conversational agents.
#[derive(Parser, Debug)]
#[command(name = "engram", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage conversation contexts.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
    /// Encrypt and store a memory.
    Store {
        /// The memory content.
        content: String,
        /// Context to file the memory under.
        #[arg(long)]
        context: String,
        /// Importance score, 1-10.
        #[arg(long, default_value_t = DEFAULT_IMPORTANCE)]
        importance: i64,
        /// Tag to attach (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Retrieve and decrypt a memory by id.
    Get { id: i64 },
    /// Text search over decrypted content.
    Search {
        query: String,
        /// Restrict to one context.
        #[arg(long)]
        context: Option<String>,
        /// Required tag (repeatable; all must match).
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Abort on the first undecryptable row instead of skipping it.
        #[arg(long)]
        strict: bool,
    },
    /// Semantic search by embedding similarity.
    Recall {
        query: String,
        /// Restrict to one context.
        #[arg(long)]
        context: Option<String>,
        /// Minimum cosine similarity (defaults from config).
        #[arg(long)]
        threshold: Option<f32>,
        /// Maximum results (defaults from config).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete a memory and its embedding.
    Forget { id: i64 },
    /// Add tags to an existing memory.
    Tag {
        id: i64,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Maintenance: sweep orphaned embeddings and compact the store.
    Maintain {
        /// Also re-embed memories with the current embedder.
        #[arg(long)]
        recompute: bool,
        /// Restrict recomputation to one context.
        #[arg(long, requires = "recompute")]
        context: Option<String>,
    },
}

/// Context management subcommands.
#[derive(Subcommand, Debug)]
enum ContextAction {
    /// Create a new context.
    New {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List all contexts.
    List,
    /// Delete a context and every memory in it.
    Clear { id: String },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("engram: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("ENGRAM_LOG")
        .unwrap_or_else(|_| EnvFilter::new("engram=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), EngramError> {
    let config = engram_config::load_and_validate()?;

    let key_file = config.crypto.key_file.as_deref().map(std::path::Path::new);
    let passphrase = if key_file.is_some() {
        None
    } else {
        prompt::get_passphrase()?
    };
    if key_file.is_none() && passphrase.is_none() {
        warn!("no key file or passphrase; using an ephemeral random key");
    }
    let key = MemoryKey::resolve(passphrase.as_ref(), key_file, config.crypto.kdf_iterations)?;

    let db = Database::open(&config.storage.database_path).await?;
    let store = MemoryStore::new(db, key);
    let index = EmbeddingIndex::new(
        store,
        Arc::new(HashEmbedder::new(config.memory.embedding_dim)),
    );

    match cli.command {
        Commands::Context { action } => match action {
            ContextAction::New { name, description } => {
                let id = index
                    .store()
                    .create_context(&name, description.as_deref())
                    .await?;
                println!("{id}");
            }
            ContextAction::List => {
                for ctx in index.store().get_contexts().await? {
                    match &ctx.description {
                        Some(desc) => println!("{}  {}  {}", ctx.id, ctx.name, desc),
                        None => println!("{}  {}", ctx.id, ctx.name),
                    }
                }
            }
            ContextAction::Clear { id } => {
                let deleted = index.store().clear_context(&id).await?;
                println!("deleted {deleted} memories");
            }
        },
        Commands::Store {
            content,
            context,
            importance,
            tags,
        } => {
            let id = index
                .store_memory(&content, &context, importance, &tags)
                .await?;
            println!("{id}");
        }
        Commands::Get { id } => {
            let record = index.store().retrieve(id).await?;
            print_record(&record, None);
        }
        Commands::Search {
            query,
            context,
            tags,
            strict,
        } => {
            let policy = if strict {
                RowErrorPolicy::Abort
            } else {
                RowErrorPolicy::Skip
            };
            let hits = index
                .search(&query, context.as_deref(), &tags, policy)
                .await?;
            for record in &hits {
                print_record(record, None);
            }
        }
        Commands::Recall {
            query,
            context,
            threshold,
            limit,
        } => {
            let hits = index
                .semantic_search(
                    &query,
                    context.as_deref(),
                    threshold.unwrap_or(config.memory.similarity_threshold),
                    limit.unwrap_or(config.memory.max_results),
                )
                .await?;
            for scored in &hits {
                print_record(&scored.record, Some(scored.similarity));
            }
        }
        Commands::Forget { id } => {
            index.delete_memory(id).await?;
        }
        Commands::Tag { id, tags } => {
            index.store().add_tags(id, &tags).await?;
        }
        Commands::Maintain { recompute, context } => {
            if recompute {
                let count = index.recompute_embeddings(context.as_deref()).await?;
                println!("recomputed {count} embeddings");
            }
            let removed = index.optimize_embeddings().await?;
            println!("removed {removed} orphaned embeddings");
        }
    }

    index.store().database().close().await
}

fn print_record(record: &engram_core::MemoryRecord, similarity: Option<f32>) {
    let tags = if record.tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", record.tags.join(", "))
    };
    match similarity {
        Some(sim) => println!(
            "#{}  ({:.3}, importance {}){}  {}",
            record.id, sim, record.importance, tags, record.content
        ),
        None => println!(
            "#{}  (importance {}){}  {}",
            record.id, record.importance, tags, record.content
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn store_parses_repeated_tags() {
        let cli = Cli::parse_from([
            "engram", "store", "note", "--context", "ctx-1", "--tag", "a", "--tag", "b",
        ]);
        match cli.command {
            Commands::Store {
                importance, tags, ..
            } => {
                assert_eq!(importance, DEFAULT_IMPORTANCE);
                assert_eq!(tags, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn tag_requires_at_least_one_tag() {
        assert!(Cli::try_parse_from(["engram", "tag", "3"]).is_err());
    }
}
