mod models;
mod receipt;

pub use models::{Comment, TopicStats};
pub use receipt::{ParseRequestHashError, Receipt, RequestHash, REQUEST_HASH_LEN};
