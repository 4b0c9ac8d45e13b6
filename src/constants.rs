/// Constants used throughout the application for consistency
pub struct Constants;

impl Constants {
    // Page sizes
    pub const DEFAULT_REQUESTS_PAGE_SIZE: usize = 5;
    pub const DEFAULT_AUDIT_PAGE_SIZE: usize = 15;

    // Detail form limits
    pub const MIN_PURPOSE_LENGTH: usize = 10;
    pub const MAX_PURPOSE_LENGTH: usize = 500;
    pub const MAX_ADDITIONAL_INFO_LENGTH: usize = 1000;
    pub const MAX_DECISION_NOTES_LENGTH: usize = 500;

    // Read retry policy
    pub const DEFAULT_READ_RETRY_ATTEMPTS: u32 = 3;
    pub const DEFAULT_READ_RETRY_BASE_DELAY_MS: u64 = 100;

    // Timezone used when APP_TIMEZONE is unset
    pub const DEFAULT_TIMEZONE: &'static str = "Asia/Tokyo";

    // Display formats
    pub const DATE_FORMAT: &'static str = "%Y-%m-%d";
    pub const DATETIME_FORMAT: &'static str = "%Y-%m-%d %H:%M";

    // Value meaning "no filter" in list views
    pub const FILTER_ALL: &'static str = "all";
}

/// Courses a reservation can be booked for
pub const COURSES: &[&str] = &[
    "CS101 - Introduction to Programming",
    "CS201 - Data Structures",
    "CS305 - Operating Systems",
    "CS340 - Computer Networks",
    "EE210 - Digital Logic",
    "EE330 - Embedded Systems",
    "PH150 - Experimental Physics",
    "CH220 - Analytical Chemistry",
];

/// Whether `course` is one of the bookable courses
pub fn is_known_course(course: &str) -> bool {
    COURSES.iter().any(|c| *c == course)
}
