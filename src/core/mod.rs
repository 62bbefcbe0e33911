pub mod aggregate;
pub mod cipher;
pub mod matcher;
pub mod similarity;
pub mod types;

pub use aggregate::aggregate_embeddings;
pub use cipher::{EmbeddingCipher, EmbeddingKey, SealedEmbedding};
pub use matcher::{MatchEngine, MatchReport, MatchResult, SkipReason, SkippedTemplate, NO_MATCH_SCORE};
pub use similarity::{cosine_similarity, l2_normalize};
pub use types::{Embedding, FaceTemplate, Identity};
