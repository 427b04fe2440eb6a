//! crates/coaching_admin_core/src/resource.rs
//!
//! The contract every remotely managed record type fulfils. A single generic
//! collection controller is written against this trait instead of one
//! hand-written controller per resource.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

use crate::domain::{
    Category, Course, CourseCreate, CourseUpdate, Department, Lesson, LessonCreate, LessonRef,
    LessonUpdate, Media, MediaCreate, MediaUpdate, NamedCreate, NamedUpdate, RecordId, Role, User,
    UserCreate, UserUpdate,
};
use crate::payload::{body_with_attachment, json_body, Payload, RequestBody};
use crate::ports::PortResult;

pub trait Resource: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Endpoint segment, e.g. `courses` for `/courses/`.
    const PATH: &'static str;
    /// Used in messages such as "Failed to fetch courses".
    const PLURAL: &'static str;
    /// Used in messages such as "Failed to create course".
    const SINGULAR: &'static str;

    type Create: Payload;
    type Update: Payload;

    fn id(&self) -> RecordId;

    fn created_at(&self) -> Option<DateTime<Utc>>;

    /// `None` for records without an activity flag.
    fn is_active(&self) -> Option<bool> {
        None
    }

    /// Sort key for name ordering.
    fn display_name(&self) -> &str;

    /// Fields matched by free-text search.
    fn search_fields(&self) -> Vec<&str>;

    /// Name of the grouping record: category for courses, course for
    /// lessons, lesson for media.
    fn parent_name(&self) -> Option<&str> {
        None
    }

    fn collection_path() -> String {
        format!("/{}/", Self::PATH)
    }

    fn item_path(id: RecordId) -> String {
        format!("/{}/{}/", Self::PATH, id)
    }
}

//=========================================================================================
// Resource implementations
//=========================================================================================

impl Resource for User {
    const PATH: &'static str = "users";
    const PLURAL: &'static str = "users";
    const SINGULAR: &'static str = "user";
    type Create = UserCreate;
    type Update = UserUpdate;

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn is_active(&self) -> Option<bool> {
        Some(self.is_active)
    }

    fn display_name(&self) -> &str {
        User::display_name(self)
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.display_name(), self.username.as_str(), self.email.as_str()];
        fields.extend(self.role_label());
        fields
    }
}

impl Resource for Course {
    const PATH: &'static str = "courses";
    const PLURAL: &'static str = "courses";
    const SINGULAR: &'static str = "course";
    type Create = CourseCreate;
    type Update = CourseUpdate;

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn is_active(&self) -> Option<bool> {
        Some(self.is_active)
    }

    fn display_name(&self) -> &str {
        &self.title
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.description.as_str(), self.instructor.as_str()]
    }

    fn parent_name(&self) -> Option<&str> {
        self.category_name.as_deref()
    }
}

impl Resource for Lesson {
    const PATH: &'static str = "lessons";
    const PLURAL: &'static str = "lessons";
    const SINGULAR: &'static str = "lesson";
    type Create = LessonCreate;
    type Update = LessonUpdate;

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn is_active(&self) -> Option<bool> {
        Some(self.is_active)
    }

    fn display_name(&self) -> &str {
        &self.title
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.title.as_str(), self.content.as_str(), self.course_name.as_str()]
    }

    fn parent_name(&self) -> Option<&str> {
        Some(self.course_name.as_str())
    }
}

impl Resource for Media {
    const PATH: &'static str = "lesson_files";
    const PLURAL: &'static str = "media files";
    const SINGULAR: &'static str = "media file";
    type Create = MediaCreate;
    type Update = MediaUpdate;

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.uploaded_at
    }

    fn is_active(&self) -> Option<bool> {
        Some(self.is_active)
    }

    fn display_name(&self) -> &str {
        self.file_name().unwrap_or(&self.kind)
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.kind.as_str()];
        fields.extend(self.file_name());
        fields.extend(self.lesson_name.as_deref());
        fields.extend(self.course_name.as_deref());
        fields
    }

    fn parent_name(&self) -> Option<&str> {
        self.lesson_name.as_deref().or(match &self.lesson {
            Some(LessonRef::Detailed(lesson)) => Some(lesson.title.as_str()),
            _ => None,
        })
    }
}

macro_rules! named_resource {
    ($record:ty, $path:literal, $plural:literal, $singular:literal) => {
        impl Resource for $record {
            const PATH: &'static str = $path;
            const PLURAL: &'static str = $plural;
            const SINGULAR: &'static str = $singular;
            type Create = NamedCreate;
            type Update = NamedUpdate;

            fn id(&self) -> RecordId {
                self.id
            }

            fn created_at(&self) -> Option<DateTime<Utc>> {
                self.created_at
            }

            fn display_name(&self) -> &str {
                &self.name
            }

            fn search_fields(&self) -> Vec<&str> {
                vec![self.name.as_str(), self.description.as_str()]
            }
        }
    };
}

named_resource!(Category, "categories", "categories", "category");
named_resource!(Department, "departments", "departments", "department");
named_resource!(Role, "roles", "roles", "role");

//=========================================================================================
// Payload implementations
//=========================================================================================

macro_rules! json_payload {
    ($($payload:ty),+ $(,)?) => {
        $(
            impl Payload for $payload {
                fn to_body(&self) -> PortResult<RequestBody> {
                    json_body(self)
                }
            }
        )+
    };
}

json_payload!(UserCreate, UserUpdate, NamedCreate, NamedUpdate);

impl Payload for CourseCreate {
    fn to_body(&self) -> PortResult<RequestBody> {
        body_with_attachment(self, "icon", self.icon.as_ref())
    }
}

impl Payload for CourseUpdate {
    fn to_body(&self) -> PortResult<RequestBody> {
        body_with_attachment(self, "icon", self.icon.as_ref())
    }
}

impl Payload for LessonCreate {
    fn to_body(&self) -> PortResult<RequestBody> {
        body_with_attachment(self, "file", self.file.as_ref())
    }
}

impl Payload for LessonUpdate {
    fn to_body(&self) -> PortResult<RequestBody> {
        body_with_attachment(self, "file", self.file.as_ref())
    }
}

impl Payload for MediaCreate {
    fn to_body(&self) -> PortResult<RequestBody> {
        body_with_attachment(self, "file", self.file.as_ref())
    }
}

impl Payload for MediaUpdate {
    fn to_body(&self) -> PortResult<RequestBody> {
        body_with_attachment(self, "file", self.file.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Attachment;
    use serde_json::json;

    #[test]
    fn paths_follow_rest_conventions() {
        assert_eq!(Course::collection_path(), "/courses/");
        assert_eq!(Media::item_path(12), "/lesson_files/12/");
        assert_eq!(Department::collection_path(), "/departments/");
        assert_eq!(<Role as Resource>::SINGULAR, "role");
    }

    #[test]
    fn media_create_is_multipart_with_type_field() {
        let payload = MediaCreate {
            lesson: 4,
            kind: "video".into(),
            is_active: true,
            file: Some(Attachment::new("clip.mp4", b"data".to_vec())),
        };
        match payload.to_body().unwrap() {
            RequestBody::Multipart(form) => {
                assert_eq!(form.text("type"), Some("video"));
                assert_eq!(form.text("lesson"), Some("4"));
                assert!(form.file("file").is_some());
            }
            other => panic!("expected multipart, got {:?}", other),
        }
    }

    #[test]
    fn partial_updates_send_only_present_fields() {
        let update = LessonUpdate {
            title: Some("A".into()),
            ..Default::default()
        };
        assert_eq!(update.to_body().unwrap(), RequestBody::Json(json!({"title": "A"})));
    }

    #[test]
    fn media_parent_falls_back_to_embedded_lesson() {
        let media: Media = serde_json::from_value(json!({
            "id": 1,
            "type": "pdf",
            "lesson": {"id": 2, "title": "Breathing"}
        }))
        .unwrap();
        assert_eq!(media.parent_name(), Some("Breathing"));
        assert_eq!(media.display_name(), "pdf");
    }
}
