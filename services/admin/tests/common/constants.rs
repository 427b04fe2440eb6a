//! Shared constants for end-to-end tests

// ============================================================================
// Credentials
// ============================================================================

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASS: &str = "correct";
pub const WRONG_PASS: &str = "wrong";

// ============================================================================
// Tokens issued by the fake backend
// ============================================================================

pub const ACCESS_TOKEN: &str = "access-1";
pub const REFRESHED_ACCESS_TOKEN: &str = "access-2";
pub const REFRESH_TOKEN: &str = "refresh-1";

// ============================================================================
// Seeded records
// ============================================================================

pub const ADMIN_ID: i64 = 1;
pub const SEEDED_COURSE_ID: i64 = 10;
pub const SEEDED_COURSE_TITLE: &str = "Breathing basics";
