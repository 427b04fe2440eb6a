//! Derived list views: search, status/parent filters, client-side sorting and
//! pagination over a cached collection.
//!
//! Views are recomputed from scratch on every call and never reorder the
//! cache they read from.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::domain::User;
use crate::resource::Resource;

pub const COURSES_PER_PAGE: usize = 9;
pub const USERS_PER_PAGE: usize = 8;
pub const DEFAULT_PER_PAGE: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

impl StatusFilter {
    /// Records without an activity flag pass every filter.
    pub fn matches(&self, is_active: Option<bool>) -> bool {
        match (self, is_active) {
            (StatusFilter::All, _) | (_, None) => true,
            (StatusFilter::Active, Some(active)) => active,
            (StatusFilter::Inactive, Some(active)) => !active,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    /// Accepts the labels the dashboard pages use for their status dropdowns.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "" | "all" => Ok(StatusFilter::All),
            "active" | "published" => Ok(StatusFilter::Active),
            "inactive" | "draft" | "completed" | "pending" => Ok(StatusFilter::Inactive),
            other => Err(format!("unknown status filter '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Keep the order the backend returned.
    #[default]
    ServerOrder,
    Newest,
    Oldest,
    Name,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "" | "server" | "default" => Ok(SortOrder::ServerOrder),
            "newest" => Ok(SortOrder::Newest),
            "oldest" => Ok(SortOrder::Oldest),
            "name" => Ok(SortOrder::Name),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

/// Filter, sort and page state of one list view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub search: String,
    pub status: StatusFilter,
    pub parent: Option<String>,
    pub sort: SortOrder,
    /// 1-based.
    pub page: usize,
    /// `0` disables pagination.
    pub per_page: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            status: StatusFilter::All,
            parent: None,
            sort: SortOrder::ServerOrder,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<R> {
    pub items: Vec<R>,
    /// Matching records across all pages.
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

impl<R> ListPage<R> {
    /// Index of the first item on this page within the filtered list, 0-based.
    pub fn start_index(&self, per_page: usize) -> usize {
        self.page.saturating_sub(1) * per_page
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = term.into();
        self
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn matches<R: Resource>(&self, record: &R) -> bool {
        let needle = self.search.trim().to_lowercase();
        let matches_search = needle.is_empty()
            || record
                .search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));

        let matches_parent = match &self.parent {
            Some(parent) => record.parent_name() == Some(parent.as_str()),
            None => true,
        };

        matches_search && matches_parent && self.status.matches(record.is_active())
    }

    /// Filters, sorts and pages `items`, cloning only the records on the page.
    pub fn apply<R: Resource>(&self, items: &[R]) -> ListPage<R> {
        let mut matching: Vec<&R> = items.iter().filter(|record| self.matches(*record)).collect();

        match self.sort {
            SortOrder::ServerOrder => {}
            SortOrder::Newest => {
                matching.sort_by(|a, b| by_created(a.created_at(), b.created_at(), true))
            }
            SortOrder::Oldest => {
                matching.sort_by(|a, b| by_created(a.created_at(), b.created_at(), false))
            }
            SortOrder::Name => matching.sort_by(|a, b| {
                a.display_name()
                    .to_lowercase()
                    .cmp(&b.display_name().to_lowercase())
            }),
        }

        let total = matching.len();
        let page = self.page.max(1);

        if self.per_page == 0 {
            return ListPage {
                items: matching.into_iter().cloned().collect(),
                total,
                page: 1,
                total_pages: 1,
            };
        }

        let total_pages = total.div_ceil(self.per_page);
        let items = matching
            .into_iter()
            .skip((page - 1).saturating_mul(self.per_page))
            .take(self.per_page)
            .cloned()
            .collect();

        ListPage {
            items,
            total,
            page,
            total_pages,
        }
    }
}

/// Records with a timestamp come before records without one.
fn by_created(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    newest_first: bool,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if newest_first => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Headline numbers shown above the users table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub admins: usize,
}

impl UserStats {
    pub fn from_users(users: &[User]) -> Self {
        users.iter().fold(Self::default(), |mut stats, user| {
            stats.total += 1;
            if user.is_active {
                stats.active += 1;
            } else {
                stats.inactive += 1;
            }
            if user
                .role_label()
                .is_some_and(|role| role.eq_ignore_ascii_case("admin"))
            {
                stats.admins += 1;
            }
            stats
        })
    }
}
