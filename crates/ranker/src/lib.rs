//! macrolens Ranker
//!
//! Temporal resolution and adaptive reranking for time-indexed economic data:
//! - Month-granularity date labels and the temporal resolver
//! - Date-window filter construction
//! - Candidate retrieval (Milvus REST)
//! - Relevance reranking with a temporal tolerance band
//! - The bounded relaxation loop
//! - Reference URL resolution and result assembly

pub mod assembler;
pub mod pipeline;
pub mod prompts;
pub mod references;
pub mod relaxation;
pub mod rerank;
pub mod retrieval;
pub mod temporal;
pub mod window;

pub use assembler::{RankedResultSet, RetrievedResult};
pub use pipeline::{RankPipeline, RetrievalSettings};
pub use relaxation::RankOutcome;
pub use retrieval::{Candidate, MilvusStore, VectorStore};
pub use temporal::{Clock, DateLabel, SystemClock, YearMonth};
