//! The café's collections and a sum type over their documents.

use std::fmt::{self, Display, Formatter};

use crate::store::api::{DocumentModel, DocumentSnapshot};
use crate::store::error::{invalid_argument, not_found, StoreResult};
use crate::store::value::MapValue;

use super::associates::Associate;
use super::checklist::ChecklistItem;
use super::inventory::{InventoryItem, InventoryNote};
use super::mail::{MailMessage, Manager};
use super::maintenance::MaintenanceTask;
use super::messages::ManagerMessage;
use super::recipes::{Issue, Recipe};
use super::safety::{SafetyRecord, SafetySpec};
use super::specials::SpecialEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Inventory,
    Notes,
    Checklists,
    Maintenance,
    SafetySpecs,
    SafetyRecords,
    SpecialEvents,
    Associates,
    ManagerMessages,
    Managers,
    Mail,
    Recipes,
    Issues,
}

impl Collection {
    pub const ALL: [Collection; 13] = [
        Collection::Inventory,
        Collection::Notes,
        Collection::Checklists,
        Collection::Maintenance,
        Collection::SafetySpecs,
        Collection::SafetyRecords,
        Collection::SpecialEvents,
        Collection::Associates,
        Collection::ManagerMessages,
        Collection::Managers,
        Collection::Mail,
        Collection::Recipes,
        Collection::Issues,
    ];

    /// Name of the collection in the store.
    pub const fn as_str(self) -> &'static str {
        match self {
            Collection::Inventory => "inventory",
            Collection::Notes => "notes",
            Collection::Checklists => "checklists",
            Collection::Maintenance => "maintenance",
            Collection::SafetySpecs => "safety-specs",
            Collection::SafetyRecords => "safety-record",
            Collection::SpecialEvents => "special-events",
            Collection::Associates => "associates",
            Collection::ManagerMessages => "managerMessages",
            Collection::Managers => "managers",
            Collection::Mail => "mail",
            Collection::Recipes => "mission-cafe",
            Collection::Issues => "issues",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|collection| collection.as_str() == name)
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded document from any café collection.
#[derive(Clone, Debug, PartialEq)]
pub enum CafeDocument {
    Inventory(InventoryItem),
    Note(InventoryNote),
    Checklist(ChecklistItem),
    Maintenance(MaintenanceTask),
    SafetySpec(SafetySpec),
    SafetyRecord(SafetyRecord),
    SpecialEvent(SpecialEvent),
    Associate(Associate),
    ManagerMessage(ManagerMessage),
    Manager(Manager),
    Mail(MailMessage),
    Recipe(Recipe),
    Issue(Issue),
}

impl CafeDocument {
    /// Decodes and validates raw fields read from `collection`.
    pub fn decode(collection: Collection, id: &str, fields: &MapValue) -> StoreResult<Self> {
        Ok(match collection {
            Collection::Inventory => Self::Inventory(InventoryItem::from_fields(id, fields)?),
            Collection::Notes => Self::Note(InventoryNote::from_fields(id, fields)?),
            Collection::Checklists => Self::Checklist(ChecklistItem::from_fields(id, fields)?),
            Collection::Maintenance => Self::Maintenance(MaintenanceTask::from_fields(id, fields)?),
            Collection::SafetySpecs => Self::SafetySpec(SafetySpec::from_fields(id, fields)?),
            Collection::SafetyRecords => Self::SafetyRecord(SafetyRecord::from_fields(id, fields)?),
            Collection::SpecialEvents => Self::SpecialEvent(SpecialEvent::from_fields(id, fields)?),
            Collection::Associates => Self::Associate(Associate::from_fields(id, fields)?),
            Collection::ManagerMessages => {
                Self::ManagerMessage(ManagerMessage::from_fields(id, fields)?)
            }
            Collection::Managers => Self::Manager(Manager::from_fields(id, fields)?),
            Collection::Mail => Self::Mail(MailMessage::from_fields(id, fields)?),
            Collection::Recipes => Self::Recipe(Recipe::from_fields(id, fields)?),
            Collection::Issues => Self::Issue(Issue::from_fields(id, fields)?),
        })
    }

    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> StoreResult<Self> {
        let name = snapshot.key().collection();
        let collection = Collection::from_name(name)
            .ok_or_else(|| invalid_argument(format!("unknown collection `{name}`")))?;
        let fields = snapshot
            .data()
            .ok_or_else(|| not_found(format!("{} does not exist", snapshot.key())))?;
        Self::decode(collection, snapshot.id(), fields)
    }

    pub fn collection(&self) -> Collection {
        match self {
            Self::Inventory(_) => Collection::Inventory,
            Self::Note(_) => Collection::Notes,
            Self::Checklist(_) => Collection::Checklists,
            Self::Maintenance(_) => Collection::Maintenance,
            Self::SafetySpec(_) => Collection::SafetySpecs,
            Self::SafetyRecord(_) => Collection::SafetyRecords,
            Self::SpecialEvent(_) => Collection::SpecialEvents,
            Self::Associate(_) => Collection::Associates,
            Self::ManagerMessage(_) => Collection::ManagerMessages,
            Self::Manager(_) => Collection::Managers,
            Self::Mail(_) => Collection::Mail,
            Self::Recipe(_) => Collection::Recipes,
            Self::Issue(_) => Collection::Issues,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Inventory(doc) => &doc.id,
            Self::Note(doc) => &doc.id,
            Self::Checklist(doc) => &doc.id,
            Self::Maintenance(doc) => &doc.id,
            Self::SafetySpec(doc) => &doc.id,
            Self::SafetyRecord(doc) => &doc.id,
            Self::SpecialEvent(doc) => &doc.id,
            Self::Associate(doc) => &doc.id,
            Self::ManagerMessage(doc) => &doc.id,
            Self::Manager(doc) => &doc.id,
            Self::Mail(doc) => &doc.id,
            Self::Recipe(doc) => &doc.id,
            Self::Issue(doc) => &doc.id,
        }
    }

    pub fn to_fields(&self) -> MapValue {
        match self {
            Self::Inventory(doc) => doc.to_fields(),
            Self::Note(doc) => doc.to_fields(),
            Self::Checklist(doc) => doc.to_fields(),
            Self::Maintenance(doc) => doc.to_fields(),
            Self::SafetySpec(doc) => doc.to_fields(),
            Self::SafetyRecord(doc) => doc.to_fields(),
            Self::SpecialEvent(doc) => doc.to_fields(),
            Self::Associate(doc) => doc.to_fields(),
            Self::ManagerMessage(doc) => doc.to_fields(),
            Self::Manager(doc) => doc.to_fields(),
            Self::Mail(doc) => doc.to_fields(),
            Self::Recipe(doc) => doc.to_fields(),
            Self::Issue(doc) => doc.to_fields(),
        }
    }
}
