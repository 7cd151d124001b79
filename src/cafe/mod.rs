//! The café admin screens, each a thin parameterization of
//! [`SynchronizedList`](crate::sync::SynchronizedList) or a direct store client.

pub mod associates;
pub mod checklist;
pub mod document;
pub mod inventory;
pub mod mail;
pub mod maintenance;
pub mod messages;
pub mod recipes;
pub mod safety;
pub mod specials;

pub use associates::{Associate, AssociatesScreen, Clearance};
pub use checklist::{ChecklistCategory, ChecklistItem, ChecklistScreen};
pub use document::{CafeDocument, Collection};
pub use inventory::{InventoryItem, InventoryNote, InventoryScreen};
pub use mail::{MailMessage, MailQueue, Manager};
pub use maintenance::{Completion, Instruction, InstructionKind, MaintenanceScreen, MaintenanceTask};
pub use messages::{ManagerMessage, MessageBoard};
pub use recipes::{FeedbackScreen, Ingredient, Issue, Recipe, RecipesScreen, ReferenceScreen, Temperature};
pub use safety::{HistoryPoint, Measurement, SafetyEntry, SafetyLog, SafetyRecord, SafetySpec};
pub use specials::{SpecialEvent, SpecialsScreen};
