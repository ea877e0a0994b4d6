//! Time-context injection for time-aware system messages.
//!
//! The block carries the user's local date, 12-hour time, weekday,
//! timezone, northern-hemisphere season, and a small set of known
//! holidays. Any previous block is removed before a fresh one is
//! appended, so repeated turns never accumulate.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::models::conversations::{Message, MessageRole};

pub const TIME_CONTEXT_OPEN: &str = "<Time Context>";
pub const TIME_CONTEXT_CLOSE: &str = "</Time Context>";

static TIME_CONTEXT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Time Context>[\s\S]*?</Time Context>").expect("static regex"));
static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Resolve an IANA timezone name, falling back to UTC on unknown zones.
pub fn resolve_timezone(timezone: Option<&str>) -> Tz {
    match timezone {
        Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!("Unknown timezone: {}, falling back to UTC", name);
            Tz::UTC
        }),
        None => Tz::UTC,
    }
}

/// Northern-hemisphere season for a calendar date.
pub fn season_for(month: u32, day: u32) -> &'static str {
    if (month == 12 && day >= 21) || month <= 2 || (month == 3 && day < 20) {
        "winter"
    } else if (month == 3 && day >= 20) || month <= 5 || (month == 6 && day < 21) {
        "spring"
    } else if (month == 6 && day >= 21) || month <= 8 || (month == 9 && day < 22) {
        "summer"
    } else {
        "autumn"
    }
}

/// The handful of holidays the context mentions.
pub fn holidays_for(month: u32, day: u32) -> Vec<&'static str> {
    let mut holidays = Vec::new();
    if month == 12 && (24..=26).contains(&day) {
        holidays.push("Christmas");
    } else if month == 1 && day == 1 {
        holidays.push("New Year's Day");
    } else if month == 7 && day == 4 {
        holidays.push("Independence Day (US)");
    }
    holidays
}

/// Render the time context for a given instant and zone.
pub fn render_time_context(now_utc: DateTime<Utc>, tz: Tz) -> String {
    let now = now_utc.with_timezone(&tz);

    let formatted_date = now.format("%A, %B %d, %Y");
    let formatted_time = now.format("%-I:%M %p");

    let mut context = format!(
        "Current date and time: {}, {} {}. Please use this information when responding \
         to time-sensitive queries, while acknowledging that your training data has a \
         cutoff date.",
        formatted_date,
        formatted_time,
        tz.name()
    );

    context.push_str(&format!(
        " It is currently {} in the northern hemisphere.",
        season_for(now.month(), now.day())
    ));

    let holidays = holidays_for(now.month(), now.day());
    if !holidays.is_empty() {
        context.push_str(&format!(" Notable current holidays: {}.", holidays.join(", ")));
    }

    context
}

/// Generate the time context for the current instant in the user's zone.
pub fn generate_time_context(timezone: Option<&str>) -> String {
    render_time_context(Utc::now(), resolve_timezone(timezone))
}

/// Strip any existing time-context block from a system message body.
pub fn strip_time_context(content: &str) -> String {
    if !content.contains(TIME_CONTEXT_OPEN) {
        return content.to_string();
    }
    let cleaned = TIME_CONTEXT_BLOCK.replace_all(content, "");
    EXCESS_BLANK_LINES
        .replace_all(&cleaned, "\n\n")
        .trim()
        .to_string()
}

/// Clean any existing time context from the system message and append a
/// fresh one. Creates a system message at the front when none exists.
pub fn clean_and_update_time_context(messages: &mut Vec<Message>, timezone: Option<&str>) {
    let system_idx = match messages.iter().position(|m| m.role == MessageRole::System) {
        Some(idx) => idx,
        None => {
            messages.insert(0, Message::system(""));
            tracing::info!("No system message found, created a new one");
            0
        }
    };

    let cleaned = strip_time_context(&messages[system_idx].content);
    let time_context = generate_time_context(timezone);
    messages[system_idx].content = format!(
        "{}\n\n{}\n{}\n{}",
        cleaned.trim(),
        TIME_CONTEXT_OPEN,
        time_context,
        TIME_CONTEXT_CLOSE
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn seasons_follow_the_northern_calendar() {
        assert_eq!(season_for(1, 15), "winter");
        assert_eq!(season_for(12, 21), "winter");
        assert_eq!(season_for(3, 19), "winter");
        assert_eq!(season_for(3, 20), "spring");
        assert_eq!(season_for(5, 1), "spring");
        assert_eq!(season_for(6, 21), "summer");
        assert_eq!(season_for(8, 15), "summer");
        assert_eq!(season_for(10, 1), "autumn");
    }

    #[test]
    fn known_holidays_are_reported() {
        assert_eq!(holidays_for(12, 25), vec!["Christmas"]);
        assert_eq!(holidays_for(12, 24), vec!["Christmas"]);
        assert_eq!(holidays_for(1, 1), vec!["New Year's Day"]);
        assert_eq!(holidays_for(7, 4), vec!["Independence Day (US)"]);
        assert!(holidays_for(8, 10).is_empty());
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timezone(Some("Not/AZone")), Tz::UTC);
        assert_eq!(resolve_timezone(None), Tz::UTC);
        assert_eq!(
            resolve_timezone(Some("America/New_York")),
            chrono_tz::America::New_York
        );
    }

    #[test]
    fn rendered_context_mentions_date_zone_and_season() {
        let instant = Utc.with_ymd_and_hms(2025, 7, 4, 16, 30, 0).unwrap();
        let context = render_time_context(instant, chrono_tz::America::New_York);
        assert!(context.contains("Friday, July 04, 2025"));
        assert!(context.contains("12:30 PM"));
        assert!(context.contains("America/New_York"));
        assert!(context.contains("summer"));
        assert!(context.contains("Independence Day (US)"));
    }

    #[test]
    fn repeated_updates_keep_a_single_block() {
        let mut messages = vec![Message::system("You are helpful."), Message::user("hi")];

        clean_and_update_time_context(&mut messages, Some("UTC"));
        clean_and_update_time_context(&mut messages, Some("UTC"));
        clean_and_update_time_context(&mut messages, Some("UTC"));

        let system = &messages[0].content;
        assert_eq!(system.matches(TIME_CONTEXT_OPEN).count(), 1);
        assert_eq!(system.matches(TIME_CONTEXT_CLOSE).count(), 1);
        assert!(system.starts_with("You are helpful."));
    }

    #[test]
    fn missing_system_message_is_created() {
        let mut messages = vec![Message::user("hello")];
        clean_and_update_time_context(&mut messages, None);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.contains(TIME_CONTEXT_OPEN));
    }

    #[test]
    fn strip_collapses_leftover_blank_lines() {
        let content = "Prompt.\n\n<Time Context>\nold\n</Time Context>\n\n\nTail.";
        let cleaned = strip_time_context(content);
        assert!(!cleaned.contains(TIME_CONTEXT_OPEN));
        assert!(!cleaned.contains("\n\n\n"));
        assert!(cleaned.starts_with("Prompt."));
        assert!(cleaned.ends_with("Tail."));
    }
}
