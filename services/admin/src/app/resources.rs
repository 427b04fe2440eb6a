//! services/admin/src/app/resources.rs
//!
//! One `RemoteCollection` per record type. Each view creates its own.

use coaching_admin_core::domain::{Category, Course, Department, Lesson, Media, Role, User};

use crate::app::client::ApiClient;
use crate::app::collection::RemoteCollection;

pub type Users = RemoteCollection<User>;
pub type Courses = RemoteCollection<Course>;
pub type Lessons = RemoteCollection<Lesson>;
pub type MediaFiles = RemoteCollection<Media>;
pub type Categories = RemoteCollection<Category>;
pub type Departments = RemoteCollection<Department>;
pub type Roles = RemoteCollection<Role>;

pub fn users(api: &ApiClient) -> Users {
    RemoteCollection::new(api.clone())
}

pub fn courses(api: &ApiClient) -> Courses {
    RemoteCollection::new(api.clone())
}

pub fn lessons(api: &ApiClient) -> Lessons {
    RemoteCollection::new(api.clone())
}

pub fn media_files(api: &ApiClient) -> MediaFiles {
    RemoteCollection::new(api.clone())
}

pub fn categories(api: &ApiClient) -> Categories {
    RemoteCollection::new(api.clone())
}

pub fn departments(api: &ApiClient) -> Departments {
    RemoteCollection::new(api.clone())
}

pub fn roles(api: &ApiClient) -> Roles {
    RemoteCollection::new(api.clone())
}
