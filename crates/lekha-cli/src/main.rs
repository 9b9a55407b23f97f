//! CLI entry point for Lekha: build the index from a folder of PDFs, then ask it questions.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use lekha_core::{
    app_data_dir, discover_documents, load_config, load_config_from, open_or_build_index,
    status, Answer, Batching, Chunker, Config, IndexPaths, Ingestion, LoaderRegistry,
    OllamaClient, RagPipeline, RetrievalSettings, TextUnit, VectorIndex,
};
use tracing_subscriber::EnvFilter;

/// Used when neither the command line nor the config names a documents folder.
const DEFAULT_DOCUMENTS_DIR: &str = "data/raw";

/// Characters of each context chunk shown with `--show-context`.
const CONTEXT_PREVIEW_CHARS: usize = 500;

#[derive(Parser)]
#[command(name = "lekha")]
#[command(about = "Lekha: ask questions about a folder of PDF documents")]
struct Cli {
    /// Config file to use instead of the one in the app data directory.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status (for dev).
    Status,
    /// Show where Lekha stores its config and index (app data directory).
    DataDir,
    /// List the documents that would be ingested from a directory.
    Scan {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Extract one document and list its text units, or look for a phrase in them.
    Load {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        /// Report the first unit containing this text.
        #[arg(long)]
        find: Option<String>,
    },
    /// Build the index from a directory of documents and persist it.
    Ingest {
        /// Defaults to `documents_root` from the config, then `data/raw`.
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
        /// Rebuild even if a stored index exists.
        #[arg(long)]
        force: bool,
    },
    /// Ask a single question.
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        show_context: bool,
    },
    /// Interactive question loop. Type `exit` to quit.
    Chat {
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        show_context: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lekha_cli=info,lekha_core=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from(path).with_context(|| format!("loading {}", path.display()))?,
        None => load_config(),
    };
    config.validate()?;

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            println!("Lekha backend");
            println!("  core: {}", status());
        }
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("Could not determine app data directory."),
        },
        Commands::Scan { path } => {
            let loaders = LoaderRegistry::from_config(&config);
            let found = discover_documents(&path, &loaders.extensions())?;
            println!("Found {} document(s) under {}", found.len(), path.display());
            for p in found {
                println!("  {}", p.display());
            }
        }
        Commands::Load { path, find } => {
            let units = LoaderRegistry::from_config(&config).load(&path)?;
            match find {
                Some(needle) => match units.iter().find(|u| u.content().contains(&needle)) {
                    Some(u) => println!(
                        "FOUND: {} | page: {} | ocr: {}",
                        path.display(),
                        u.page_number().unwrap_or_default(),
                        u.is_ocr()
                    ),
                    None => println!("NOT FOUND: {}", path.display()),
                },
                None => {
                    println!("{} unit(s) from {}", units.len(), path.display());
                    for u in &units {
                        println!(
                            "  page {:>4}  ocr={:<5}  {}",
                            u.page_number().unwrap_or_default(),
                            u.is_ocr(),
                            preview(u.content(), 60)
                        );
                    }
                }
            }
        }
        Commands::Ingest { path, force } => {
            let root = documents_root(path, &config);
            let client = OllamaClient::from_config(&config.ollama)?;
            let index = open_index(&root, &config, &client, force).await?;
            println!("Index ready: {} chunk(s), dimension {}", index.len(), index.dimension());
        }
        Commands::Ask {
            question,
            top_k,
            show_context,
        } => {
            let rag = pipeline(&config).await?;
            let answer = rag.answer(&question, top_k.unwrap_or(rag.settings().top_k)).await?;
            print_answer(&answer, show_context);
        }
        Commands::Chat {
            top_k,
            show_context,
        } => {
            let rag = pipeline(&config).await?;
            let top_k = top_k.unwrap_or(rag.settings().top_k);
            println!("\nLekha is ready. Ask in any language (type 'exit' to quit)\n");
            let stdin = io::stdin();
            loop {
                print!("You: ");
                io::stdout().flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let question = line.trim();
                if question.eq_ignore_ascii_case("exit") {
                    println!("Goodbye!");
                    break;
                }
                if question.is_empty() {
                    continue;
                }
                match rag.answer(question, top_k).await {
                    Ok(answer) => print_answer(&answer, show_context),
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
        }
    }
    Ok(())
}

fn documents_root(arg: Option<PathBuf>, config: &Config) -> PathBuf {
    arg.or_else(|| config.documents_root())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCUMENTS_DIR))
}

fn index_paths(config: &Config) -> Result<IndexPaths> {
    let dir = config
        .index_dir()
        .context("could not determine index directory")?;
    Ok(IndexPaths::in_dir(&dir))
}

async fn open_index(
    root: &Path,
    config: &Config,
    client: &OllamaClient,
    force: bool,
) -> Result<VectorIndex> {
    let loaders = LoaderRegistry::from_config(config);
    let ingestion = Ingestion {
        loaders: &loaders,
        chunker: Chunker::from_config(&config.chunking)?,
        embedder: client,
        batching: Batching {
            batch_size: config.retrieval.embed_batch_size,
            concurrency: config.retrieval.embed_concurrency,
        },
        expected_dimension: config.embedding_dimension,
    };
    Ok(open_or_build_index(root, &index_paths(config)?, &ingestion, force).await?)
}

async fn pipeline(config: &Config) -> Result<RagPipeline<OllamaClient, OllamaClient>> {
    let client = OllamaClient::from_config(&config.ollama)?;
    let root = documents_root(None, config);
    let index = open_index(&root, config, &client, false).await?;
    Ok(RagPipeline::new(
        client.clone(),
        client,
        index.into_shared(),
        RetrievalSettings::from(&config.retrieval),
    ))
}

fn print_answer(answer: &Answer, show_context: bool) {
    println!("\nBot: {}\n", answer.text.trim());
    if show_context {
        println!("Retrieved context:");
        for (i, unit) in answer.context.iter().enumerate() {
            print_context_unit(i + 1, unit);
        }
        println!();
    }
}

fn print_context_unit(rank: usize, unit: &TextUnit) {
    let source = unit
        .source()
        .map(|s| {
            Path::new(s)
                .file_name()
                .map_or_else(|| s.to_string(), |n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "Unknown".to_string());
    println!(
        "  [{rank}] {source} | page {} | ocr: {}",
        unit.page_number().map_or("?".to_string(), |p| p.to_string()),
        unit.is_ocr()
    );
    println!("      {}", preview(unit.content(), CONTEXT_PREVIEW_CHARS));
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
