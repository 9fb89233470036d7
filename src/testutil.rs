//! In-memory doubles for the store, push gateway and identity provider.

use anyhow::{anyhow, bail, ensure, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::fcm::{PushError, PushGateway};
use crate::identity::{IdentityProvider, NewIdentityAccount};
use crate::models::{
    NewNotification, NotificationRecord, PushMessage, UserAccount, UserType,
};
use crate::store::{DocumentStore, FCM_TOKENS, MAX_BATCH_SIZE, NOTIFICATIONS, USERS};

type Docs = HashMap<String, HashMap<String, (serde_json::Value, DateTime<Utc>)>>;

#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Docs>,
    fail_collections: Mutex<HashSet<String>>,
    fail_insert_user: AtomicBool,
    delete_batch_sizes: Mutex<Vec<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes find/delete on `collection` fail, for partial-failure tests.
    pub fn fail_collection(&self, collection: &str) {
        self.fail_collections
            .lock()
            .unwrap()
            .insert(collection.to_string());
    }

    pub fn set_fail_insert_user(&self, fail: bool) {
        self.fail_insert_user.store(fail, Ordering::SeqCst);
    }

    pub fn put_doc(&self, collection: &str, id: &str, data: serde_json::Value) {
        self.put_doc_at(collection, id, data, Utc::now());
    }

    pub fn put_doc_at(
        &self,
        collection: &str,
        id: &str,
        data: serde_json::Value,
        created_at: DateTime<Utc>,
    ) {
        self.docs
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), (data, created_at));
    }

    pub fn put_push_token(&self, user_id: &str, token: &str) {
        self.put_doc(FCM_TOKENS, user_id, serde_json::json!({ "token": token }));
    }

    pub fn put_user(&self, uid: &str, display_name: &str, user_type: UserType) {
        let user = UserAccount {
            uid: uid.to_string(),
            display_name: display_name.to_string(),
            email: format!("{}@example.com", uid),
            user_type,
            phone: String::new(),
            company_name: String::new(),
            is_active: true,
            is_online: false,
            created_at: Utc::now(),
        };
        self.put_doc(USERS, uid, serde_json::to_value(&user).unwrap());
    }

    pub fn put_notification_at(&self, id: &str, user_id: &str, created_at: DateTime<Utc>) {
        let record = NotificationRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: "t".to_string(),
            body: "b".to_string(),
            category: crate::models::NotificationCategory::General,
            data: HashMap::new(),
            read: false,
            created_at,
            dispatch_ref: "ref".to_string(),
        };
        self.put_doc_at(
            NOTIFICATIONS,
            id,
            serde_json::to_value(&record).unwrap(),
            created_at,
        );
    }

    pub fn count(&self, collection: &str) -> usize {
        self.docs
            .lock()
            .unwrap()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.docs
            .lock()
            .unwrap()
            .get(NOTIFICATIONS)
            .map(|c| {
                c.values()
                    .map(|(v, _)| serde_json::from_value(v.clone()).unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_push_token_sync(&self, user_id: &str) -> Option<String> {
        self.docs
            .lock()
            .unwrap()
            .get(FCM_TOKENS)
            .and_then(|c| c.get(user_id))
            .and_then(|(v, _)| v.get("token").and_then(|t| t.as_str()).map(String::from))
    }

    pub fn get_user_sync(&self, uid: &str) -> Option<UserAccount> {
        self.docs
            .lock()
            .unwrap()
            .get(USERS)
            .and_then(|c| c.get(uid))
            .map(|(v, _)| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn delete_batch_sizes(&self) -> Vec<usize> {
        self.delete_batch_sizes.lock().unwrap().clone()
    }

    fn check_failure(&self, collection: &str) -> Result<()> {
        if self.fail_collections.lock().unwrap().contains(collection) {
            bail!("simulated store failure for {}", collection);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_push_token(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.get_push_token_sync(user_id))
    }

    async fn delete_push_token(&self, user_id: &str) -> Result<()> {
        if let Some(c) = self.docs.lock().unwrap().get_mut(FCM_TOKENS) {
            c.remove(user_id);
        }
        Ok(())
    }

    async fn get_user(&self, uid: &str) -> Result<Option<UserAccount>> {
        Ok(self.get_user_sync(uid))
    }

    async fn insert_user(&self, user: &UserAccount) -> Result<()> {
        if self.fail_insert_user.load(Ordering::SeqCst) {
            bail!("simulated profile write failure");
        }
        self.put_doc(USERS, &user.uid, serde_json::to_value(user)?);
        Ok(())
    }

    async fn insert_notification(&self, new: NewNotification) -> Result<NotificationRecord> {
        let record = NotificationRecord {
            id: format!("rec-{}", self.count(NOTIFICATIONS) + 1),
            user_id: new.user_id,
            title: new.title,
            body: new.body,
            category: new.category,
            data: new.data,
            read: false,
            created_at: Utc::now(),
            dispatch_ref: new.dispatch_ref,
        };
        self.put_doc_at(
            NOTIFICATIONS,
            &record.id,
            serde_json::to_value(&record)?,
            record.created_at,
        );
        Ok(record)
    }

    async fn find_ids_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<String>> {
        self.check_failure(collection)?;
        let docs = self.docs.lock().unwrap();
        let mut ids: Vec<String> = docs
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, (data, _))| data.get(field).and_then(|v| v.as_str()) == Some(value))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    async fn find_notifications_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .get(NOTIFICATIONS)
            .map(|c| {
                c.iter()
                    .filter(|(_, (_, created_at))| *created_at < cutoff)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<u64> {
        ensure!(ids.len() <= MAX_BATCH_SIZE, "batch exceeds store limit");
        self.check_failure(collection)?;
        self.delete_batch_sizes.lock().unwrap().push(ids.len());

        let mut docs = self.docs.lock().unwrap();
        let mut deleted = 0;
        if let Some(c) = docs.get_mut(collection) {
            for id in ids {
                if c.remove(id).is_some() {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }
}

/// Gateway double that records every accepted message.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<PushMessage>>,
    unregistered: AtomicBool,
    counter: AtomicU64,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unregistered(&self, unregistered: bool) {
        self.unregistered.store(unregistered, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        if self.unregistered.load(Ordering::SeqCst) {
            return Err(PushError::TokenUnregistered);
        }
        self.sent.lock().unwrap().push(message.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("projects/test/messages/{}", n))
    }
}

/// Gateway double that always fails at the transport level.
pub struct FailingGateway;

#[async_trait]
impl PushGateway for FailingGateway {
    async fn send(&self, _message: &PushMessage) -> Result<String, PushError> {
        Err(PushError::Other(anyhow!("gateway unavailable")))
    }
}

#[derive(Default)]
pub struct StubIdentity {
    tokens: Mutex<HashMap<String, String>>,
    created: Mutex<Vec<NewIdentityAccount>>,
    deleted: Mutex<Vec<String>>,
    fail_delete: AtomicBool,
    counter: AtomicU64,
}

impl StubIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_token(&self, token: &str, uid: &str) {
        self.tokens
            .lock()
            .unwrap()
            .insert(token.to_string(), uid.to_string());
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<NewIdentityAccount> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn verify_id_token(&self, id_token: &str) -> Result<String> {
        self.tokens
            .lock()
            .unwrap()
            .get(id_token)
            .cloned()
            .ok_or_else(|| anyhow!("unknown id token"))
    }

    async fn create_account(&self, new: &NewIdentityAccount) -> Result<String> {
        self.created.lock().unwrap().push(new.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("uid-{}", n))
    }

    async fn delete_account(&self, uid: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            bail!("simulated identity deletion failure");
        }
        self.deleted.lock().unwrap().push(uid.to_string());
        Ok(())
    }
}
