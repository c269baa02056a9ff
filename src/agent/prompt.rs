use chrono::{ DateTime, SecondsFormat, Utc };

/// Fills `{system_time}` in the configured system prompt.
pub fn render_system_prompt(template: &str, now: DateTime<Utc>) -> String {
    template.replace("{system_time}", &now.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn substitutes_system_time() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let rendered = render_system_prompt("Be helpful.\nSystem time: {system_time}", now);
        assert_eq!(rendered, "Be helpful.\nSystem time: 2024-05-01T12:30:00Z");
    }

    #[test]
    fn leaves_plain_prompts_alone() {
        assert_eq!(render_system_prompt("No placeholders", Utc::now()), "No placeholders");
    }
}
