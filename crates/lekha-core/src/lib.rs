//! All pipeline logic independent of how the app is run.
//!
//! Documents live in a folder the user chooses. Lekha stores only config and the
//! persisted index in its own app data directory (see [app_data]).
//!
//! Build time: [loader] → [chunks] → [gateway::Embedder] → [store::VectorIndex].
//! Query time: question → embedder → [store::VectorIndex::search] → [rag::RagPipeline] → generator.

pub mod app_data;
pub mod chunks;
pub mod config;
pub mod documents;
pub mod gateway;
pub mod index;
pub mod loader;
pub mod ollama;
pub mod rag;
pub mod store;
pub mod text_unit;

pub use app_data::app_data_dir;
pub use chunks::Chunker;
pub use config::{load_config, load_config_from, save_config, set_documents_root, Config, ConfigError};
pub use documents::{discover_documents, ScanError};
pub use gateway::{embed_all, Batching, Embedder, GatewayError, Generator};
pub use index::{build_index, load_documents, open_or_build_index, IngestError, Ingestion};
pub use loader::{LoadError, Loader, LoaderRegistry, PdfLoader, TextFileLoader};
pub use ollama::{OllamaClient, OllamaError};
pub use rag::{build_prompt, Answer, QueryError, RagPipeline, RetrievalSettings};
pub use store::{IndexPaths, SharedIndex, StoreError, VectorIndex};
pub use text_unit::{MetaValue, Metadata, TextUnit};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "lekha-core ready"
}
