//! Outbound mail queue. A mail extension on the store side delivers every document
//! written to `mail`; this crate only writes them.

use std::sync::Arc;

use crate::store::api::{decode_snapshot, DocumentModel, FieldReader, Query};
use crate::store::datastore::RemoteStore;
use crate::store::error::{validation, StoreResult};
use crate::store::model::DocumentKey;
use crate::store::value::{MapValue, Value};

use super::document::Collection;

#[derive(Clone, Debug, PartialEq)]
pub struct MailMessage {
    pub id: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

impl DocumentModel for MailMessage {
    fn collection() -> &'static str {
        Collection::Mail.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        let (subject, html) = match reader.map("message")? {
            Some(message) => {
                let message = reader.nested("message", message);
                (message.text("subject")?, message.text("html")?)
            }
            None => (String::new(), String::new()),
        };
        Ok(Self {
            id: id.to_string(),
            to: reader.string_list("to")?,
            subject,
            html,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty()
            .with("to", Value::from_strings(self.to.iter().cloned()))
            .with(
                "message",
                MapValue::empty()
                    .with("subject", self.subject.as_str())
                    .with("html", self.html.as_str()),
            )
    }
}

/// A manager who receives inventory reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manager {
    pub id: String,
    pub email: Option<String>,
}

impl DocumentModel for Manager {
    fn collection() -> &'static str {
        Collection::Managers.as_str()
    }

    fn from_fields(id: &str, fields: &MapValue) -> StoreResult<Self> {
        let reader = FieldReader::new(Self::collection(), id, fields);
        Ok(Self {
            id: id.to_string(),
            email: reader.string("email")?,
        })
    }

    fn to_fields(&self) -> MapValue {
        MapValue::empty().with_optional("email", self.email.as_deref())
    }
}

#[derive(Clone)]
pub struct MailQueue {
    store: Arc<dyn RemoteStore>,
}

impl MailQueue {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Addresses of every manager that has one.
    pub async fn manager_emails(&self) -> StoreResult<Vec<String>> {
        let snapshot = self.store.list(&Query::new(Manager::collection())?).await?;
        let managers: Vec<Manager> = decode_snapshot(&snapshot);
        Ok(managers
            .into_iter()
            .filter_map(|manager| manager.email)
            .filter(|email| !email.trim().is_empty())
            .collect())
    }

    /// Removes every queued message; returns how many were removed.
    pub async fn clear(&self) -> StoreResult<usize> {
        let snapshot = self.store.list(&Query::new(MailMessage::collection())?).await?;
        for doc in snapshot.documents() {
            self.store.delete(doc.key()).await?;
        }
        Ok(snapshot.len())
    }

    pub async fn enqueue(&self, to: Vec<String>, subject: &str, html: &str) -> StoreResult<DocumentKey> {
        if to.is_empty() {
            return Err(validation("mail needs at least one recipient"));
        }
        let message = MailMessage {
            id: String::new(),
            to,
            subject: subject.to_string(),
            html: html.to_string(),
        };
        let key = self
            .store
            .add(MailMessage::collection(), message.to_fields())
            .await?;
        log::debug!("queued mail {key} to {} recipient(s)", message.to.len());
        Ok(key)
    }

    /// Replaces whatever is queued with one message to all managers.
    pub async fn send_to_managers(&self, subject: &str, html: &str) -> StoreResult<DocumentKey> {
        self.clear().await?;
        let recipients = self.manager_emails().await?;
        self.enqueue(recipients, subject, html).await
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::store::datastore::InMemoryStore;

    #[tokio::test]
    async fn send_to_managers_replaces_queued_mail() {
        let store = Arc::new(InMemoryStore::new());
        for (id, email) in [("a", "ana@cafe.com"), ("b", "")] {
            let key = DocumentKey::new("managers", id).unwrap();
            store.set(&key, MapValue::empty().with("email", email)).await.unwrap();
        }
        let queue = MailQueue::new(store.clone());
        queue
            .enqueue(vec!["old@cafe.com".into()], "Old", "<p>old</p>")
            .await
            .unwrap();

        let key = queue.send_to_managers("Inventory Update", "<h3>Inventory</h3>").await.unwrap();

        let queued = store.list(&Query::new("mail").unwrap()).await.unwrap();
        assert_eq!(queued.len(), 1);
        let mail = MailMessage::from_snapshot(&store.get(&key).await.unwrap()).unwrap();
        assert_eq!(mail.to, vec!["ana@cafe.com".to_string()]);
        assert_eq!(mail.subject, "Inventory Update");
    }

    #[tokio::test]
    async fn refuses_mail_without_recipients() {
        let queue = MailQueue::new(Arc::new(InMemoryStore::new()));
        let err = queue.send_to_managers("Inventory", "<p/>").await.unwrap_err();
        assert!(err.is_validation());
    }
}
