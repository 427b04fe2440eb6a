//! crates/coaching_admin_core/src/domain.rs
//!
//! Records owned by the backend and cached by the client, together with the
//! payloads used to create and update them.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::payload::Attachment;

/// Server-assigned, immutable record id.
pub type RecordId = i64;

fn default_true() -> bool {
    true
}

//=========================================================================================
// References
//=========================================================================================

/// A foreign key that the backend serializes either as an id or as a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Id(RecordId),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSummary {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The role of a user: the profile endpoint embeds it, list endpoints send
/// an id or a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleRef {
    Id(RecordId),
    Name(String),
    Detailed(RoleSummary),
}

impl RoleRef {
    pub fn name(&self) -> Option<&str> {
        match self {
            RoleRef::Id(_) => None,
            RoleRef::Name(name) => Some(name),
            RoleRef::Detailed(role) => Some(&role.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSummary {
    pub id: RecordId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
}

/// The lesson a media file belongs to. A back-reference only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LessonRef {
    Id(RecordId),
    Detailed(LessonSummary),
}

impl LessonRef {
    pub fn id(&self) -> RecordId {
        match self {
            LessonRef::Id(id) => *id,
            LessonRef::Detailed(lesson) => lesson.id,
        }
    }
}

//=========================================================================================
// Users
//=========================================================================================

/// An account record.
///
/// Fields the client does not model are kept in `extra` so that merging a
/// server response never drops data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnoses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_recipient: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Full name when set, otherwise the username.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.username)
    }

    /// The role's display name, whichever shape the backend used.
    pub fn role_label(&self) -> Option<&str> {
        self.role_name
            .as_deref()
            .or_else(|| self.role.as_ref().and_then(RoleRef::name))
    }

    /// Applies the present fields of `update` in place.
    pub fn apply(&mut self, update: &UserUpdate) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
        fn set_opt<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *slot = value.clone();
            }
        }

        set(&mut self.username, &update.username);
        set(&mut self.email, &update.email);
        set_opt(&mut self.full_name, &update.full_name);
        set_opt(&mut self.first_name, &update.first_name);
        set_opt(&mut self.last_name, &update.last_name);
        set_opt(&mut self.profile_picture, &update.profile_picture);
        if update.role.is_some() {
            // role_name describes the old role and would shadow the new one.
            self.role_name = None;
            self.role = update.role.clone();
        }
        set_opt(&mut self.department, &update.department);
        set_opt(&mut self.phone_number, &update.phone_number);
        set_opt(&mut self.address, &update.address);
        set_opt(&mut self.emergency_contact_name, &update.emergency_contact_name);
        set_opt(&mut self.emergency_contact_phone, &update.emergency_contact_phone);
        set_opt(&mut self.postal_code, &update.postal_code);
        set_opt(&mut self.city, &update.city);
        set_opt(&mut self.allergies, &update.allergies);
        set(&mut self.diagnoses, &update.diagnoses);
        set_opt(&mut self.alarm_recipient, &update.alarm_recipient);
        set(&mut self.is_active, &update.is_active);
    }
}

/// A partial user update; only present fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnoses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreate {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub role: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

//=========================================================================================
// Courses, Lessons and Media
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: RecordId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default)]
    pub instructor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default)]
    pub level: String,
    /// URL of the uploaded icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseCreate {
    pub title: String,
    pub category: Reference,
    pub instructor: String,
    pub duration: i64,
    pub level: String,
    pub color: String,
    pub description: String,
    pub is_active: bool,
    #[serde(skip)]
    pub icon: Option<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CourseUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip)]
    pub icon: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: RecordId,
    /// Back-reference to the owning course.
    pub course: RecordId,
    #[serde(default)]
    pub course_name: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<i64>,
    pub course: RecordId,
    pub content: String,
    pub is_active: bool,
    #[serde(skip)]
    pub file: Option<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LessonUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip)]
    pub file: Option<Attachment>,
}

/// A file attached to a lesson (served from `/lesson_files/`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson: Option<LessonRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Media {
    /// Last path segment of the file URL.
    pub fn file_name(&self) -> Option<&str> {
        self.file
            .as_deref()
            .and_then(|url| url.rsplit('/').find(|segment| !segment.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaCreate {
    pub lesson: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_active: bool,
    #[serde(skip)]
    pub file: Option<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson: Option<RecordId>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip)]
    pub file: Option<Attachment>,
}

//=========================================================================================
// Categories, Departments and Roles
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Create payload shared by categories, departments and roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedCreate {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamedUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

//=========================================================================================
// Authentication
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Response of the token-issuance endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Response of the token-refresh endpoint. Backends that rotate refresh
/// tokens also return a new `refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedToken {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub user: User,
    pub access: String,
    pub refresh: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Shallow-merges the keys of `overlay` over the serialized form of `base`,
/// the way an object spread does, and decodes the result.
pub fn merge_over<T>(base: &T, overlay: Value) -> serde_json::Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = serde_json::to_value(base)?;
    if let (Value::Object(target), Value::Object(source)) = (&mut merged, overlay) {
        for (key, value) in source {
            target.insert(key, value);
        }
    }
    serde_json::from_value(merged)
}
