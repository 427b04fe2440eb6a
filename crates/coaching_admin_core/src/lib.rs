pub mod domain;
pub mod payload;
pub mod ports;
pub mod resource;
pub mod validation;
pub mod view;

pub use domain::{
    merge_over, Category, Course, CourseCreate, CourseUpdate, Credentials, Department, Lesson,
    LessonCreate, LessonRef, LessonSummary, LessonUpdate, LoginResponse, Media, MediaCreate,
    MediaUpdate, NamedCreate, NamedUpdate, RecordId, Reference, RefreshedToken, Role, RoleRef,
    RoleSummary, TokenPair, User, UserCreate, UserUpdate,
};
pub use payload::{Attachment, MultipartForm, Payload, RequestBody};
pub use ports::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, KeyValueStore, PortError, PortResult,
};
pub use resource::Resource;
pub use validation::{Validate, ValidationErrors};
pub use view::{ListPage, ListQuery, SortOrder, StatusFilter, UserStats};
