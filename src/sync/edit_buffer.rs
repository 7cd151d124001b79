use std::collections::{BTreeMap, BTreeSet};

use crate::store::api::DocumentSnapshot;
use crate::store::model::Timestamp;
use crate::store::query_evaluator::values_equal;
use crate::store::value::{MapValue, Value};

/// A user edit not yet confirmed by the store.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalEdit {
    pub document_id: String,
    pub field: String,
    pub value: Value,
    pub created_at: Timestamp,
    /// Value currently handed to the writer, if any.
    pub in_flight: Option<Value>,
    pub failed: bool,
    // Every value this client sent for the field while the edit lived; snapshots
    // carrying one of them are echoes of our own writes.
    sent: Vec<Value>,
}

impl LocalEdit {
    fn new(document_id: &str, field: &str, value: Value) -> Self {
        Self {
            document_id: document_id.to_string(),
            field: field.to_string(),
            value,
            created_at: Timestamp::now(),
            in_flight: None,
            failed: false,
            sent: Vec::new(),
        }
    }

    fn is_own_echo(&self, remote: &Value) -> bool {
        self.sent.iter().any(|sent| values_equal(sent, remote))
    }
}

/// A remote document with outstanding local edits laid over it.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedDocument {
    pub id: String,
    pub fields: MapValue,
    pub pending_fields: BTreeSet<String>,
    pub failed_fields: BTreeSet<String>,
    pub version: u64,
    pub update_time: Option<Timestamp>,
}

impl MergedDocument {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn is_pending(&self, field: &str) -> bool {
        self.pending_fields.contains(field)
    }

    pub fn has_failed(&self, field: &str) -> bool {
        self.failed_fields.contains(field)
    }
}

/// Edit for `(document_id, field)` dropped because a newer remote value won.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Superseded {
    pub document_id: String,
    pub field: String,
}

/// Outstanding local edits keyed by document and field.
///
/// The buffer owns the optimistic half of a list: it is the only place local values
/// live until the store confirms them, a newer remote value supersedes them, or the
/// user cancels.
#[derive(Debug, Default)]
pub struct EditBuffer {
    edits: BTreeMap<(String, String), LocalEdit>,
    last_seen: BTreeMap<String, MapValue>,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for the field, replacing any earlier edit and refreshing its
    /// creation time.
    pub fn apply_local_edit(&mut self, document_id: &str, field: &str, value: Value) {
        let key = (document_id.to_string(), field.to_string());
        match self.edits.get_mut(&key) {
            Some(edit) => {
                edit.value = value;
                edit.created_at = Timestamp::now();
                edit.failed = false;
            }
            None => {
                self.edits.insert(key, LocalEdit::new(document_id, field, value));
            }
        }
    }

    /// Overlays every outstanding edit on the latest snapshot of its document.
    /// Documents missing from `snapshots` are not resurrected by their edits.
    pub fn reconcile(&self, snapshots: &[DocumentSnapshot]) -> Vec<MergedDocument> {
        snapshots
            .iter()
            .filter_map(|snapshot| {
                let mut fields = snapshot.data()?.clone();
                let mut pending_fields = BTreeSet::new();
                let mut failed_fields = BTreeSet::new();
                for edit in self.edits_for(snapshot.id()) {
                    fields.insert(edit.field.clone(), edit.value.clone());
                    pending_fields.insert(edit.field.clone());
                    if edit.failed {
                        failed_fields.insert(edit.field.clone());
                    }
                }
                Some(MergedDocument {
                    id: snapshot.id().to_string(),
                    fields,
                    pending_fields,
                    failed_fields,
                    version: snapshot.version(),
                    update_time: snapshot.update_time(),
                })
            })
            .collect()
    }

    /// Compares a fresh snapshot list against outstanding edits.
    ///
    /// Edits whose value the store now holds are cleared as converged. An edit is
    /// superseded when the snapshot was written after the edit was made, changed that
    /// field since the previous snapshot, and carries a value this client never sent.
    /// Superseded edits are removed and returned so their pending writes can be
    /// discarded. `snapshots` is the whole result set; documents absent from it are
    /// forgotten.
    pub fn observe_snapshot(&mut self, snapshots: &[DocumentSnapshot]) -> Vec<Superseded> {
        let mut superseded = Vec::new();
        let null = Value::null();
        let present: BTreeSet<&str> = snapshots
            .iter()
            .filter(|snapshot| snapshot.exists())
            .map(DocumentSnapshot::id)
            .collect();
        self.last_seen.retain(|id, _| present.contains(id.as_str()));

        for snapshot in snapshots {
            let Some(data) = snapshot.data() else {
                continue;
            };
            let previous = self.last_seen.get(snapshot.id());
            let mut converged = Vec::new();

            for edit in self.edits_for(snapshot.id()) {
                let remote = data.get(&edit.field).unwrap_or(&null);
                if values_equal(remote, &edit.value) {
                    if edit.in_flight.is_none() {
                        converged.push(edit.field.clone());
                    }
                    continue;
                }
                let written_after_edit = snapshot
                    .update_time()
                    .is_some_and(|update_time| update_time > edit.created_at);
                let field_changed = match previous {
                    Some(previous) => {
                        !values_equal(previous.get(&edit.field).unwrap_or(&null), remote)
                    }
                    None => true,
                };
                if written_after_edit && field_changed && !edit.is_own_echo(remote) {
                    superseded.push(Superseded {
                        document_id: edit.document_id.clone(),
                        field: edit.field.clone(),
                    });
                }
            }

            for field in converged {
                self.edits.remove(&(snapshot.id().to_string(), field));
            }
            self.last_seen.insert(snapshot.id().to_string(), data.clone());
        }

        for lost in &superseded {
            log::debug!(
                "remote change to {}.{} supersedes local edit",
                lost.document_id,
                lost.field
            );
            self.edits
                .remove(&(lost.document_id.clone(), lost.field.clone()));
        }
        superseded
    }

    /// Notes that `fields` were issued to the store for the document.
    pub fn mark_in_flight(&mut self, document_id: &str, fields: &MapValue) {
        for (field, value) in fields.fields() {
            if let Some(edit) = self.edit_mut(document_id, field) {
                edit.in_flight = Some(value.clone());
                edit.failed = false;
                edit.sent.push(value.clone());
            }
        }
    }

    /// Clears edits whose current value is exactly what the store confirmed and
    /// returns the cleared field names. Edits changed since the write stay buffered.
    pub fn confirm(&mut self, document_id: &str, fields: &MapValue) -> Vec<String> {
        let mut cleared = Vec::new();
        for (field, written) in fields.fields() {
            let key = (document_id.to_string(), field.clone());
            let Some(edit) = self.edits.get_mut(&key) else {
                continue;
            };
            if edit
                .in_flight
                .as_ref()
                .is_some_and(|in_flight| values_equal(in_flight, written))
            {
                edit.in_flight = None;
            }
            if values_equal(&edit.value, written) {
                self.edits.remove(&key);
                cleared.push(field.clone());
            }
        }
        cleared
    }

    /// Keeps the edits behind a failed write, flagged so they can be retried.
    pub fn mark_failed(&mut self, document_id: &str, fields: &MapValue) {
        for (field, written) in fields.fields() {
            if let Some(edit) = self.edit_mut(document_id, field) {
                edit.in_flight = None;
                if values_equal(&edit.value, written) {
                    edit.failed = true;
                }
            }
        }
    }

    /// Counts `value` as written by this client for the field without changing what
    /// is in flight, e.g. for a value a rollback is about to restore.
    pub fn mark_sent(&mut self, document_id: &str, field: &str, value: &Value) {
        if let Some(edit) = self.edit_mut(document_id, field) {
            edit.sent.push(value.clone());
        }
    }

    /// Puts back an edit taken out earlier, replacing whatever is buffered for its field.
    pub fn restore(&mut self, edit: LocalEdit) {
        self.edits
            .insert((edit.document_id.clone(), edit.field.clone()), edit);
    }

    pub fn clear_edit(&mut self, document_id: &str, field: &str) -> Option<LocalEdit> {
        self.edits
            .remove(&(document_id.to_string(), field.to_string()))
    }

    /// Drops every edit for the document, e.g. after it was deleted remotely.
    pub fn clear_document(&mut self, document_id: &str) -> Vec<LocalEdit> {
        let keys: Vec<_> = self
            .edits
            .keys()
            .filter(|(id, _)| id == document_id)
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|key| self.edits.remove(&key))
            .collect()
    }

    pub fn get(&self, document_id: &str, field: &str) -> Option<&LocalEdit> {
        self.edits
            .get(&(document_id.to_string(), field.to_string()))
    }

    pub fn pending_for<'a>(&'a self, document_id: &'a str) -> Vec<&'a LocalEdit> {
        self.edits_for(document_id).collect()
    }

    pub fn failed_edits(&self) -> Vec<&LocalEdit> {
        self.edits.values().filter(|edit| edit.failed).collect()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    fn edits_for<'a>(&'a self, document_id: &'a str) -> impl Iterator<Item = &'a LocalEdit> + 'a {
        self.edits
            .values()
            .filter(move |edit| edit.document_id == document_id)
    }

    fn edit_mut(&mut self, document_id: &str, field: &str) -> Option<&mut LocalEdit> {
        self.edits
            .get_mut(&(document_id.to_string(), field.to_string()))
    }
}
