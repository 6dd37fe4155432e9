//! OpenAI-compatible chat client: streaming completions with tool calls,
//! embeddings, and the prompts used by the assistant.

pub mod embeddings;
pub mod prompts;
pub mod providers;
pub mod types;

pub use embeddings::{Embedder, OpenAiEmbedder};
pub use providers::{collect_completion, BoxedStream, ChatModel, OpenAiCompatModel, StreamChunk};
pub use types::*;
