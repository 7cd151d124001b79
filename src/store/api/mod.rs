pub mod converter;
pub mod query;
pub mod snapshot;
pub mod write_batch;

pub use converter::{decode_documents, decode_snapshot, DocumentModel, FieldReader};
pub use query::{FieldFilter, FilterOperator, OrderBy, OrderDirection, Query, QuerySnapshot};
pub use snapshot::DocumentSnapshot;
pub use write_batch::{WriteBatch, MAX_BATCH_WRITES};
