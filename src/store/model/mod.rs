mod document_key;
mod timestamp;

pub use document_key::{generate_auto_id, DocumentKey};
pub use timestamp::Timestamp;
