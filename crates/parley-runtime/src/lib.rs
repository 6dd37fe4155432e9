//! Agent runtime: a two-node graph that alternates LLM calls and tool
//! execution, plus the tools it can call.

pub mod graph;
pub mod tools;
pub mod types;

pub use graph::{AgentGraph, AgentStream};
pub use tools::{MovieSearchTool, Tool, ToolRegistry, MOVIE_SEARCH_TOOL};
pub use types::*;
