//! services/admin/src/app/overview.rs
//!
//! Figures for the dashboard landing page.

use coaching_admin_core::domain::{Course, Lesson, User};
use coaching_admin_core::ports::PortResult;
use coaching_admin_core::resource::Resource;
use coaching_admin_core::view::{ListQuery, SortOrder, UserStats};
use tracing::debug;

use crate::app::client::ApiClient;

const RECENT_COURSES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardOverview {
    pub users: usize,
    pub courses: usize,
    pub lessons: usize,
    pub user_stats: UserStats,
    /// Newest first.
    pub recent_courses: Vec<Course>,
}

impl DashboardOverview {
    /// Loads users, courses and lessons concurrently. Fails if any of the
    /// three requests fails.
    pub async fn load(api: &ApiClient) -> PortResult<Self> {
        let users_path = User::collection_path();
        let courses_path = Course::collection_path();
        let lessons_path = Lesson::collection_path();

        let (users, courses, lessons) = futures::try_join!(
            api.get::<Vec<User>>(&users_path),
            api.get::<Vec<Course>>(&courses_path),
            api.get::<Vec<Lesson>>(&lessons_path),
        )?;
        debug!(
            users = users.len(),
            courses = courses.len(),
            lessons = lessons.len(),
            "Dashboard loaded"
        );

        let recent_courses = ListQuery::new()
            .sort(SortOrder::Newest)
            .per_page(RECENT_COURSES)
            .apply(&courses)
            .items;

        Ok(Self {
            users: users.len(),
            courses: courses.len(),
            lessons: lessons.len(),
            user_stats: UserStats::from_users(&users),
            recent_courses,
        })
    }
}
