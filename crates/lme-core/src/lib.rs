pub mod cross_encoder;
pub mod embedder;
pub mod error;
#[cfg(feature = "embeddings")]
pub mod fastembed_embedder;
pub mod format;
pub mod http;
pub mod http_embedder;
pub mod http_reranker;
pub mod scoring;
pub mod session;

pub use cross_encoder::CrossEncoder;
pub use embedder::Embedder;
pub use error::{LmeError, LmeResult};
#[cfg(feature = "embeddings")]
pub use fastembed_embedder::{FastEmbedder, FastReranker};
pub use http::ServiceEndpoint;
pub use http_embedder::HttpEmbedder;
pub use http_reranker::HttpReranker;
pub use scoring::Bm25Params;
pub use session::{Environment, EnvironmentMetadata, Session, SessionRecord, Turn};
