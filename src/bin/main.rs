use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stratavec::{
    AppConfig, ChunkCache, Embedder, HnswIndex, InMemoryChunkCache, InMemoryObjectStore,
    ObjectStore, Reader, StubEmbedder, Writer,
};

#[derive(Parser)]
#[command(name = "stratavec-cli")]
#[command(about = "Ingest a text file and query it against an in-memory stratavec corpus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a newline-delimited text file as one document, then run a query.
    Demo {
        /// Text file to ingest, one passage per line.
        file: PathBuf,
        /// Query text to search for after ingestion.
        query: String,
        /// Number of hits to return.
        #[arg(short, long, default_value = "5")]
        k: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stratavec=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo { file, query, k } => run_demo(file, query, k).await?,
    }
    Ok(())
}

async fn run_demo(file: PathBuf, query: String, k: usize) -> Result<()> {
    let mut config = AppConfig::from_env();
    config.dimension = 64;

    let content = std::fs::read_to_string(&file)?;
    let passages: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.to_string())
        .collect();
    println!("Ingesting {} passages from {:?}", passages.len(), file);

    let index = Arc::new(HnswIndex::new(&config)?);
    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
    let cache: Arc<dyn ChunkCache> =
        Arc::new(InMemoryChunkCache::new(Duration::from_secs(config.cache_ttl_seconds)));
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new(config.dimension));

    let writer = Writer::new(index.clone(), store.clone(), embedder.clone(), config);
    let ingest = writer
        .ingest(&file.to_string_lossy(), &passages)
        .await?;
    println!(
        "Ingested document {} across {} chunk(s)",
        ingest.document,
        ingest.chunks.len()
    );
    if !ingest.succeeded() {
        for chunk in ingest.chunks.iter().filter(|c| c.error.is_some()) {
            eprintln!(
                "chunk {} failed to upload: {}",
                chunk.chunk_id,
                chunk.error.as_deref().unwrap_or("unknown")
            );
        }
    }

    let reader = Reader::new(index, store, cache, embedder);
    let result = reader.query(&query, k).await?;
    println!("Top {} hit(s) for \"{}\":", result.hits.len(), query);
    for hit in &result.hits {
        println!(
            "  document={} chunk={} offset={} distance={:.4}",
            hit.document, hit.chunk, hit.offset, hit.distance
        );
    }
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }

    Ok(())
}
