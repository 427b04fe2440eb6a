//! Client-side field validation. Payloads that fail here are never sent.

use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::domain::{
    CourseCreate, CourseUpdate, LessonCreate, LessonUpdate, MediaCreate, MediaUpdate, NamedCreate,
    NamedUpdate, UserCreate, UserUpdate,
};

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid");
}

pub const MIN_PASSWORD_LEN: usize = 8;

/// Field name to message, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `field`; the first message per field wins.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn require(&mut self, field: &str, label: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, format!("{} is required", label));
        }
    }

    fn require_present(&mut self, field: &str, label: &str, value: Option<&String>) {
        if let Some(value) = value {
            self.require(field, label, value);
        }
    }

    fn email(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, "Email is required");
        } else if !is_valid_email(value) {
            self.add(field, "Email is invalid");
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationErrors>;
}

impl Validate for UserCreate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("username", "Username", &self.username);
        errors.require("first_name", "First name", &self.first_name);
        errors.require("last_name", "Last name", &self.last_name);
        errors.email("email", &self.email);
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
            );
        }
        errors.require("role", "Role", &self.role);
        errors.into_result()
    }
}

impl Validate for UserUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_present("username", "Username", self.username.as_ref());
        if let Some(email) = &self.email {
            errors.email("email", email);
        }
        errors.into_result()
    }
}

impl Validate for CourseCreate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("title", "Title", &self.title);
        errors.require("description", "Description", &self.description);
        errors.require("instructor", "Instructor", &self.instructor);
        errors.require("level", "Level", &self.level);
        if let crate::domain::Reference::Name(name) = &self.category {
            errors.require("category", "Category", name);
        }
        if self.duration <= 0 {
            errors.add("duration", "Duration must be greater than zero");
        }
        errors.into_result()
    }
}

impl Validate for CourseUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_present("title", "Title", self.title.as_ref());
        errors.require_present("instructor", "Instructor", self.instructor.as_ref());
        if matches!(self.duration, Some(duration) if duration <= 0) {
            errors.add("duration", "Duration must be greater than zero");
        }
        errors.into_result()
    }
}

impl Validate for LessonCreate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("title", "Title", &self.title);
        errors.require("content", "Content", &self.content);
        if self.course <= 0 {
            errors.add("course", "Course is required");
        }
        if matches!(self.day, Some(day) if day < 1) {
            errors.add("day", "Day must be 1 or later");
        }
        errors.into_result()
    }
}

impl Validate for LessonUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_present("title", "Title", self.title.as_ref());
        errors.require_present("content", "Content", self.content.as_ref());
        if matches!(self.day, Some(day) if day < 1) {
            errors.add("day", "Day must be 1 or later");
        }
        errors.into_result()
    }
}

impl Validate for MediaCreate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.lesson <= 0 {
            errors.add("lesson", "Lesson is required");
        }
        match &self.file {
            Some(file) if !file.bytes.is_empty() => {}
            _ => errors.add("file", "File is required"),
        }
        errors.into_result()
    }
}

impl Validate for MediaUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if matches!(&self.file, Some(file) if file.bytes.is_empty()) {
            errors.add("file", "File is empty");
        }
        errors.into_result()
    }
}

impl Validate for NamedCreate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("name", "Name", &self.name);
        errors.into_result()
    }
}

impl Validate for NamedUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require_present("name", "Name", self.name.as_ref());
        errors.into_result()
    }
}
