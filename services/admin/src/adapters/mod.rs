pub mod http;
pub mod storage;

pub use http::ReqwestTransport;
pub use storage::{FileStore, MemoryStore};
