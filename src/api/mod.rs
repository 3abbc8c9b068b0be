pub mod backend;
pub mod client;
pub mod types;

pub use backend::{BackendError, ChatBackend, ChunkStream, SendResponse};
pub use client::HttpBackend;
pub use types::{HistoryResponse, SendRequest};
