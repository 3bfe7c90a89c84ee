//! Fallback email content for days not covered by a plan.
//!
//! Trial-day content comes from the precomputed plan. Once a subscriber runs
//! past the last planned entry (or has no active plan), sends fall back to
//! templated ongoing content keyed by the day number.

/// Subject and body for one outgoing course email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub content: String,
}

/// Generic post-plan content for the given day number.
pub fn generic_email(day_number: u32) -> EmailContent {
    EmailContent {
        subject: format!("Day {day_number}: Advanced Lesson"),
        content: format!(
            "Welcome to day {day_number}!\n\n\
             Today's advanced lesson continues your learning journey.\n\n\
             As a subscriber, you have unlimited access to daily insights and \
             lessons designed to help you grow.\n\n\
             Keep up the great work - your consistency is paying off.\n\n\
             Tomorrow, we'll explore new concepts together."
        ),
    }
}
