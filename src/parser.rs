use crate::error::ErrorInfo;
use lazy_static::lazy_static;
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use url::Url;
use uuid::Uuid;

lazy_static! {
    static ref URL_PATTERN: Regex =
        Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap();
}

/// One email, parsed once per scan and immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedEmail {
    pub id: Uuid,
    pub headers: Headers,
    pub body: BodyContent,
    pub urls: Vec<UrlRecord>,
    pub parse_error: Option<ErrorInfo>,
}

/// Header values with MIME encoded-words already decoded. Absent headers are
/// empty strings (`from`, `subject`) or `None` (`reply_to`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Headers {
    pub from: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub received: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BodyContent {
    pub plain_text: Option<String>,
    pub html: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlRecord {
    pub url: String,
    pub domain: String,
}

/// Parse raw RFC-822 text into a [`ParsedEmail`]. Never fails: structural
/// errors come back as a `parse_error` on an otherwise empty record.
pub fn parse(raw: &str) -> ParsedEmail {
    match parse_mail(raw.as_bytes()) {
        Ok(msg) => build_parsed(&msg),
        Err(e) => {
            log::warn!("Failed to parse email: {e}");
            ParsedEmail {
                id: Uuid::new_v4(),
                headers: Headers::default(),
                body: BodyContent::default(),
                urls: Vec::new(),
                parse_error: Some(ErrorInfo::parsing(format!("Failed to parse email: {e}"))),
            }
        }
    }
}

fn build_parsed(msg: &ParsedMail) -> ParsedEmail {
    let headers = Headers {
        from: msg.headers.get_first_value("From").unwrap_or_default(),
        reply_to: msg.headers.get_first_value("Reply-To"),
        subject: msg.headers.get_first_value("Subject").unwrap_or_default(),
        received: msg.headers.get_all_values("Received"),
    };

    let body = extract_body(msg);
    let urls = extract_urls(
        body.plain_text.as_deref().unwrap_or(""),
        body.html.as_deref().unwrap_or(""),
    );

    ParsedEmail {
        id: Uuid::new_v4(),
        headers,
        body,
        urls,
        parse_error: None,
    }
}

/// First `text/plain` and first `text/html` part win; a single-part message
/// with an unrecognized content type is treated as plain text.
fn extract_body(msg: &ParsedMail) -> BodyContent {
    let mut plain_text = None;
    let mut html = None;

    if msg.subparts.is_empty() {
        let payload = msg.get_body().unwrap_or_default();
        if msg.ctype.mimetype.eq_ignore_ascii_case("text/html") {
            html = Some(payload);
        } else {
            plain_text = Some(payload);
        }
    } else {
        collect_parts(msg, &mut plain_text, &mut html);
    }

    BodyContent { plain_text, html }
}

fn collect_parts(part: &ParsedMail, plain_text: &mut Option<String>, html: &mut Option<String>) {
    for sub in &part.subparts {
        if !sub.subparts.is_empty() {
            collect_parts(sub, plain_text, html);
            continue;
        }
        match sub.ctype.mimetype.to_ascii_lowercase().as_str() {
            "text/plain" if plain_text.is_none() => *plain_text = sub.get_body().ok(),
            "text/html" if html.is_none() => *html = sub.get_body().ok(),
            _ => {}
        }
    }
}

/// Scan both body variants for URLs, deduplicated by exact string in
/// first-seen order. Entries without a resolvable host are dropped.
fn extract_urls(plain_text: &str, html: &str) -> Vec<UrlRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for text in [plain_text, html] {
        for found in URL_PATTERN.find_iter(text) {
            let raw = found.as_str();
            if !seen.insert(raw.to_string()) {
                continue;
            }
            match url_domain(raw) {
                Some(domain) => records.push(UrlRecord {
                    url: raw.to_string(),
                    domain,
                }),
                None => log::debug!("Dropping URL without a usable host: {raw}"),
            }
        }
    }

    records
}

fn url_domain(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    parsed
        .host_str()
        .filter(|host| !host.is_empty())
        .map(|host| host.to_string())
}
