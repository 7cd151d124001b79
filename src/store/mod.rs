//! Document store client: values, keys, queries, snapshots, and the remote store seam.

pub mod api;
pub mod datastore;
pub mod error;
pub mod model;
pub mod query_evaluator;
pub mod value;

pub use api::{
    decode_documents, decode_snapshot, DocumentModel, DocumentSnapshot, FieldFilter, FieldReader, FilterOperator,
    OrderBy, OrderDirection, Query, QuerySnapshot, WriteBatch,
};
pub use datastore::{InMemoryStore, RemoteStore, RemoteStoreArc, WriteOperation};
pub use error::{StoreError, StoreErrorCode, StoreResult};
pub use model::{DocumentKey, Timestamp};
pub use value::{MapValue, Value, ValueKind};
