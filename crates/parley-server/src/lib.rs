//! Parley HTTP server: conversation storage, browser chat over SSE, and the
//! tool-using agent over JSON, NDJSON and SSE.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
