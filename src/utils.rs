use time::format_description::well_known::Rfc3339;

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn shorten_body(body: &str) -> String {
    let trimmed = body.replace('\n', " ").trim().to_string();
    if trimmed.chars().count() > 400 {
        format!("{}...", trimmed.chars().take(400).collect::<String>())
    } else {
        trimmed
    }
}

pub fn format_status_error(status: reqwest::StatusCode, body: &str) -> String {
    let body = shorten_body(body);
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status} - {body}")
    }
}

/// Masks an opaque secret for log lines, keeping only its length and edges.
pub fn mask_secret(value: &str) -> String {
    let len = value.chars().count();
    if len <= 8 {
        return format!("***({len})");
    }
    let head = value.chars().take(3).collect::<String>();
    let tail = value.chars().skip(len - 3).collect::<String>();
    format!("{head}...{tail}({len})")
}
