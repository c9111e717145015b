//! Semantic search over git history.
//!
//! File contents and commit messages are split into line-bounded chunks,
//! embedded once per distinct chunk into a persistent vector store, and
//! queried by similarity combined with exact-phrase, token and file-name
//! boosts. Results are ranked per file; matching lines are recomputed on
//! demand for each query.

mod blocking;
pub mod cache;
#[cfg(feature = "candle")]
pub mod candle;
pub mod chunker;
pub mod embedding;
pub mod engine;
pub mod hashing;
pub mod results;
pub mod scoring;
pub mod store;

pub use cache::{EmbedFailure, IndexReport};
pub use engine::{Engine, EngineState};
pub use results::FileMatch;
