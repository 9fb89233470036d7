use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Delivery,
    Payment,
    Journey,
    System,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Motorista,
    Cliente,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub uid: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub email: String,
    #[serde(rename = "userType")]
    pub user_type: UserType,
    #[serde(default)]
    pub phone: String,
    #[serde(rename = "companyName", default)]
    pub company_name: String,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "isOnline")]
    pub is_online: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A stored notification, one per successfully delivered dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    #[serde(default)]
    pub data: HashMap<String, String>,
    pub read: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "dispatchRef")]
    pub dispatch_ref: String,
}

/// Fields of a notification record before the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub data: HashMap<String, String>,
    pub dispatch_ref: String,
}

/// Message envelope handed to the push gateway.
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub data: HashMap<String, String>,
}

/// Outcome of a single facade send.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Sent { message_id: String, record_id: String },
    SkippedNoToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
}

/// A document-store change event as delivered by the store webhook. The
/// document payloads stay untyped; the trigger handlers only poke at the
/// handful of fields they care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEvent {
    #[serde(rename = "event")]
    pub kind: EventKind,
    #[serde(rename = "documentId")]
    pub document_id: String,
    #[serde(default)]
    pub before: Option<serde_json::Value>,
    pub after: serde_json::Value,
}

/// Result of a full account deletion sweep. Never persisted; returned to
/// the calling admin for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    #[serde(rename = "deletedCount")]
    pub deleted_count: u64,
    pub errors: Vec<String>,
    #[serde(rename = "firebaseAuthDeleted")]
    pub auth_deleted: bool,
    pub success: bool,
}
