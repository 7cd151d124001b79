//! Client-side synchronization between a screen and the document store: live queries,
//! optimistic edits, and debounced, ordered persistence.

pub mod edit_buffer;
pub mod list;
pub mod notify;
pub mod schema;
pub mod settings;
pub mod subscription;
pub mod writer;

pub use edit_buffer::{EditBuffer, LocalEdit, MergedDocument, Superseded};
pub use list::{ListView, SynchronizedList};
pub use notify::{
    report_result, LogNotifier, Notification, NotificationLevel, NotificationQueue, Notifier, NotifierArc,
};
pub use schema::{format_phone, is_valid_email, FieldKind, FieldSchema, FieldSpec};
pub use settings::{RetrySettings, SyncSettings, SyncSettingsUpdate};
pub use subscription::{SnapshotStream, SubscriptionHandle, SubscriptionManager};
pub use writer::{PendingWrite, WriteCoordinator, WriteMode, WriteOutcome};
