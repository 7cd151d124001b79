//! Drink recipes and reference sheets, both kept in `mission-cafe`, and the feedback
//! staff leave on reference sheets in `issues`.

use std::cmp::Ordering;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Days, NaiveDate, Utc};
use regex::{Captures, Regex};

use crate::store::api::{DocumentModel, FieldReader, Query};
use crate::store::datastore::RemoteStore;
use crate::store::error::{validation, StoreResult};
use crate::store::model::{DocumentKey, Timestamp};
use crate::store::value::{MapValue, Value};
use crate::sync::{report_result, FieldSchema, Notification, Notifier, SyncSettings, SynchronizedList};

use super::document::Collection;
use super::maintenance::Instruction;

/// `temperature` value marking a document as a reference sheet rather than a recipe.
pub const REFERENCE_TEMPERATURE: &str = "reference";
const UNKNOWN_REFERENCE: &str = "Unknown";
const ANONYMOUS: &str = "Anonymous";

static DATE_OFFSET: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\^\^(\d+)\^\^")
        .map_err(|err| log::error!("invalid date offset pattern: {err}"))
        .ok()
});

/// Menu section of a recipe, in menu order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Temperature {
    Hot,
    Cold,
    Other,
    Reference,
}

impl Temperature {
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("hot") => Temperature::Hot,
            Some("cold") => Temperature::Cold,
            Some(REFERENCE_TEMPERATURE) => Temperature::Reference,
            _ => Temperature::Other,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ingredient {
    pub name: String,
    /// Comma separated cup sizes, e.g. `12oz, 16oz`.
    pub sizes: String,
    /// Amounts matching `sizes` one for one.
    pub amounts: String,
}

impl Ingredient {
    /// `(size, amount)` pairs; a size without an amount is dropped.
    pub fn portions(&self) -> Vec<(&str, &str)> {
        split_list(&self.sizes)
            .into_iter()
            .zip(split_list(&self.amounts))
            .collect()
    }

    fn to_value(&self) -> Value {
        MapValue::empty()
            .with("ingredientName", self.name.as_str())
            .with("ingredientSizes", self.sizes.as_str())
            .with("ingredientAmounts", self.amounts.as_str())
            .into()
    }
}

fn split_list(text: &str) -> Vec<&str> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// A drink recipe, or a reference sheet when `temperature` is `reference`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub temperature: Option<String>,
    /// Set on reference sheets only, e.g. `new` or `zmanager`.
    pub status: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<Instruction>,
}

impl Recipe {
    pub fn temperature(&self) -> Temperature {
        Temperature::from_name(self.temperature.as_deref())
    }

    pub fn is_reference(&self) -> bool {
        self.temperature() == Temperature::Reference
    }

    /// Instruction texts with every `^^N^^` replaced by the date N days after `today`.
    pub fn instruction_texts(&self, today: NaiveDate) -> Vec<String> {
        self.instructions
            .iter()
            .map(|instruction| substitute_dates(&instruction.text, today))
            .collect()
    }
}

impl DocumentModel for Recipe {
    fn collection() -> &'static str {
        Collection::Recipes.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        let ingredients = reader
            .maps("ingredients")?
            .into_iter()
            .map(|entry| {
                let entry = reader.nested("ingredients", entry);
                Ok(Ingredient {
                    name: entry.text("ingredientName")?,
                    sizes: entry.text("ingredientSizes")?,
                    amounts: entry.text("ingredientAmounts")?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Self {
            id: id.to_string(),
            name: reader.text("name")?,
            temperature: reader.string("temperature")?,
            status: reader.string("status")?,
            ingredients,
            instructions: Instruction::read_all(&reader, fields)?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with("name", self.name.as_str())
            .with_optional("temperature", self.temperature.as_deref())
            .with_optional("status", self.status.as_deref())
            .with(
                "ingredients",
                Value::from_array(self.ingredients.iter().map(Ingredient::to_value).collect()),
            )
            .with(
                "instructions",
                Value::from_array(self.instructions.iter().map(Instruction::to_value).collect()),
            )
    }
}

/// Replaces `^^N^^` with the date N days after `today`, formatted like `26-Dec-2024`.
pub fn substitute_dates(text: &str, today: NaiveDate) -> String {
    let Some(pattern) = DATE_OFFSET.as_ref() else {
        return text.to_string();
    };
    pattern
        .replace_all(text, |captures: &Captures<'_>| {
            captures[1]
                .parse::<u64>()
                .ok()
                .and_then(|days| today.checked_add_days(Days::new(days)))
                .map(|date| date.format("%d-%b-%Y").to_string())
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

/// Recipes without reference sheets: hot drinks, then cold, then the rest, each by name.
pub fn menu_order(recipes: Vec<Recipe>) -> Vec<Recipe> {
    let mut menu: Vec<Recipe> = recipes
        .into_iter()
        .filter(|recipe| !recipe.is_reference())
        .collect();
    menu.sort_by(|a, b| {
        a.temperature()
            .cmp(&b.temperature())
            .then_with(|| compare_names(&a.name, &b.name))
    });
    menu
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Feedback left on a reference sheet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Issue {
    pub id: String,
    pub date: Option<Timestamp>,
    pub description: String,
    /// Name of the sheet the feedback is about.
    pub reference: String,
    pub name: String,
    pub resolved: bool,
}

impl DocumentModel for Issue {
    fn collection() -> &'static str {
        Collection::Issues.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        // Early issues named the sheet under `recipe`.
        let reference = match reader.string("reference")? {
            Some(reference) => reference,
            None => reader.text("recipe")?,
        };
        let name = reader
            .string("name")?
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string());
        Ok(Self {
            id: id.to_string(),
            date: reader.timestamp("date")?,
            description: reader.text("description")?,
            reference,
            name,
            resolved: reader.boolean("resolved")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with_optional("date", self.date)
            .with("description", self.description.as_str())
            .with("reference", self.reference.as_str())
            .with("resolved", self.resolved)
            .with("name", self.name.as_str())
    }
}

pub fn recipes_query() -> StoreResult<Query> {
    Query::new(Recipe::collection())
}

pub fn reference_query() -> StoreResult<Query> {
    Ok(Query::new(Recipe::collection())?
        .where_eq("temperature", REFERENCE_TEMPERATURE)
        .order_by_asc("status"))
}

/// The recipe book, loaded once.
pub struct RecipesScreen {
    list: SynchronizedList,
}

impl RecipesScreen {
    pub fn new(store: Arc<dyn RemoteStore>, settings: SyncSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            list: SynchronizedList::new(
                store,
                Recipe::collection(),
                FieldSchema::new(),
                settings,
                notifier,
            ),
        }
    }

    pub async fn load(&self) -> StoreResult<()> {
        self.list.load_once(recipes_query()?).await
    }

    pub fn recipes(&self) -> Vec<Recipe> {
        menu_order(self.list.view().decode())
    }
}

/// Live reference sheets with a feedback form on each.
pub struct ReferenceScreen {
    list: SynchronizedList,
    notifier: Arc<dyn Notifier>,
}

impl ReferenceScreen {
    pub fn new(store: Arc<dyn RemoteStore>, settings: SyncSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            list: SynchronizedList::new(
                store,
                Recipe::collection(),
                FieldSchema::new(),
                settings,
                Arc::clone(&notifier),
            ),
            notifier,
        }
    }

    pub async fn open(&self) -> StoreResult<()> {
        self.list.open(reference_query()?).await
    }

    pub fn sheets(&self) -> Vec<Recipe> {
        self.list.view().decode()
    }

    /// Files feedback on a sheet. Both the submitter's name and the description are
    /// required.
    pub async fn submit_feedback(
        &self,
        sheet_id: &str,
        name: &str,
        description: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DocumentKey> {
        let (name, description) = (name.trim(), description.trim());
        if name.is_empty() || description.is_empty() {
            self.notifier.notify(Notification::error(
                "Please complete all fields before submitting.",
            ));
            return Err(validation("feedback needs a name and a description"));
        }
        let reference = self
            .sheets()
            .into_iter()
            .find(|sheet| sheet.id == sheet_id)
            .map(|sheet| sheet.name)
            .unwrap_or_else(|| UNKNOWN_REFERENCE.to_string());
        let issue = Issue {
            id: String::new(),
            date: Some(Timestamp::from(now)),
            description: description.to_string(),
            reference,
            name: name.to_string(),
            resolved: false,
        };
        let result = self
            .list
            .store()
            .add(Issue::collection(), issue.to_fields())
            .await;
        report_result(
            self.notifier.as_ref(),
            result,
            Some("Thank you for your feedback! It has been submitted."),
            "An error occurred while submitting your feedback. Please try again.",
        )
    }

    pub async fn close(&self) {
        self.list.close().await;
    }
}

/// Unresolved feedback, loaded once.
pub struct FeedbackScreen {
    list: SynchronizedList,
}

impl FeedbackScreen {
    pub fn new(store: Arc<dyn RemoteStore>, settings: SyncSettings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            list: SynchronizedList::new(
                store,
                Issue::collection(),
                FieldSchema::new(),
                settings,
                notifier,
            ),
        }
    }

    pub async fn load(&self) -> StoreResult<()> {
        self.list.load_once(Query::new(Issue::collection())?).await
    }

    /// Open issues, oldest first.
    pub fn unresolved(&self) -> Vec<Issue> {
        let mut issues: Vec<Issue> = self
            .list
            .view()
            .decode::<Issue>()
            .into_iter()
            .filter(|issue| !issue.resolved)
            .collect();
        issues.sort_by_key(|issue| issue.date);
        issues
    }
}
