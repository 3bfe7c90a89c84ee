//! HTML bodies for the course emails and login links.

use crate::config::TRIAL_LIMIT;
use crate::plan::content::EmailContent;

/// Render a course email body.
///
/// `checkout_url` is attached on the final trial email when set. After the
/// trial, subscribed readers get a dashboard link in the footer instead.
pub fn course_email(
    content: &EmailContent,
    day_number: u32,
    base_url: &str,
    checkout_url: Option<&str>,
) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "<div style=\"font-family: Georgia, serif; max-width: 600px; margin: 0 auto; \
         padding: 24px; color: #1a1a1a; line-height: 1.6;\">\
         <p style=\"color: #888; font-size: 13px; text-transform: uppercase; \
         letter-spacing: 1px;\">Day {day_number}</p>"
    ));

    for paragraph in content.content.split("\n\n") {
        let paragraph = paragraph.trim();
        if !paragraph.is_empty() {
            body.push_str(&format!("<p>{}</p>", paragraph.replace('\n', "<br>")));
        }
    }

    if let Some(url) = checkout_url {
        body.push_str(&format!(
            "<div style=\"margin: 32px 0; text-align: center;\">\
             <a href=\"{url}\" style=\"background: #1a1a1a; color: #fff; \
             padding: 14px 28px; text-decoration: none; border-radius: 6px; \
             display: inline-block;\">Keep the emails coming</a>\
             <p style=\"color: #888; font-size: 13px;\">This is email {day_number} of your \
             free trial. Subscribe to continue past day {TRIAL_LIMIT}.</p></div>"
        ));
    } else if day_number > TRIAL_LIMIT {
        body.push_str(&format!(
            "<p style=\"color: #888; font-size: 13px; margin-top: 32px;\">\
             Manage your goals any time from your \
             <a href=\"{base_url}/dashboard\">dashboard</a>.</p>"
        ));
    }

    body.push_str("</div>");
    body
}

/// Render the magic-link login email.
pub fn magic_link_email(verify_url: &str) -> String {
    format!(
        "<div style=\"font-family: Georgia, serif; max-width: 600px; margin: 0 auto; \
         padding: 24px; color: #1a1a1a; line-height: 1.6;\">\
         <h2>Sign in to your course</h2>\
         <p>Click the button below to sign in. The link works once and expires \
         in 15 minutes.</p>\
         <div style=\"margin: 32px 0; text-align: center;\">\
         <a href=\"{verify_url}\" style=\"background: #1a1a1a; color: #fff; \
         padding: 14px 28px; text-decoration: none; border-radius: 6px; \
         display: inline-block;\">Sign in</a></div>\
         <p style=\"color: #888; font-size: 13px;\">If you did not request this \
         email you can safely ignore it.</p></div>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> EmailContent {
        EmailContent {
            subject: "Day 3: Momentum".into(),
            content: "First paragraph.\n\nSecond paragraph.".into(),
        }
    }

    #[test]
    fn course_email_splits_paragraphs() {
        let html = course_email(&content(), 3, "https://example.com", None);
        assert!(html.contains("<p>First paragraph.</p>"));
        assert!(html.contains("<p>Second paragraph.</p>"));
        assert!(html.contains("Day 3"));
    }

    #[test]
    fn checkout_button_only_when_url_given() {
        let with = course_email(&content(), 7, "https://example.com", Some("https://pay.example/c"));
        assert!(with.contains("https://pay.example/c"));
        assert!(with.contains("free trial"));

        let without = course_email(&content(), 7, "https://example.com", None);
        assert!(!without.contains("free trial"));
    }

    #[test]
    fn post_trial_email_links_dashboard() {
        let html = course_email(&content(), 8, "https://example.com", None);
        assert!(html.contains("https://example.com/dashboard"));
    }

    #[test]
    fn magic_link_email_embeds_url() {
        let html = magic_link_email("https://example.com/api/auth/verify?token=abc");
        assert!(html.contains("token=abc"));
        assert!(html.contains("15 minutes"));
    }
}
