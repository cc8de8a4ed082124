use super::*;
use crate::frame::ErrorCode;
use time::macros::datetime;

#[test]
fn parse_trims_both_fields() {
    let candidate = NewBookmark::parse("  Example  ", " https://example.com ").unwrap();
    assert_eq!(candidate.title(), "Example");
    assert_eq!(candidate.url(), "https://example.com");
}

#[test]
fn parse_rejects_empty_title() {
    assert_eq!(NewBookmark::parse("", "https://example.com"), Err(ValidationError::EmptyTitle));
    assert_eq!(NewBookmark::parse("   ", "https://example.com"), Err(ValidationError::EmptyTitle));
}

#[test]
fn parse_rejects_empty_url() {
    assert_eq!(NewBookmark::parse("Example", ""), Err(ValidationError::EmptyUrl));
    assert_eq!(NewBookmark::parse("Example", " \t "), Err(ValidationError::EmptyUrl));
}

#[test]
fn parse_rejects_text_that_is_not_a_url() {
    let err = NewBookmark::parse("Example", "not a url").unwrap_err();
    assert_eq!(err, ValidationError::InvalidUrl("not a url".into()));
    assert_eq!(err.error_code(), "E_INVALID_URL");
}

#[test]
fn parse_rejects_relative_reference() {
    assert!(matches!(NewBookmark::parse("Example", "/just/a/path"), Err(ValidationError::InvalidUrl(_))));
    assert!(matches!(NewBookmark::parse("Example", "example.com"), Err(ValidationError::InvalidUrl(_))));
}

#[test]
fn parse_accepts_non_http_absolute_urls() {
    assert!(NewBookmark::parse("Mail", "mailto:someone@example.com").is_ok());
    assert!(NewBookmark::parse("Local", "http://localhost:3000/x?y=1#z").is_ok());
}

#[test]
fn validation_messages_are_user_facing() {
    assert_eq!(ValidationError::EmptyTitle.to_string(), "Both title and URL are required.");
    assert_eq!(
        ValidationError::InvalidUrl("x".into()).to_string(),
        "Please enter a valid URL (include https://)."
    );
    assert!(!ValidationError::EmptyUrl.retryable());
}

#[test]
fn bookmark_reads_store_row() {
    let json = r#"{
        "id": "7d3c",
        "user_id": "u-1",
        "title": "Rust",
        "url": "https://www.rust-lang.org",
        "created_at": "2025-02-03T04:05:06.123456+00:00"
    }"#;
    let bookmark: Bookmark = serde_json::from_str(json).unwrap();
    assert_eq!(bookmark.id, "7d3c");
    assert_eq!(bookmark.owner, "u-1");
    assert_eq!(bookmark.created_at.date(), datetime!(2025-02-03 04:05:06 UTC).date());
}

#[test]
fn bookmark_writes_wire_field_names() {
    let bookmark = Bookmark {
        id: "1".into(),
        owner: "u".into(),
        title: "t".into(),
        url: "https://example.com".into(),
        created_at: datetime!(2025-01-01 00:00:00 UTC),
    };
    let value = serde_json::to_value(&bookmark).unwrap();
    assert_eq!(value["user_id"], "u");
    assert_eq!(value["created_at"], "2025-01-01T00:00:00Z");
    assert!(value.get("owner").is_none());
}

#[test]
fn only_http_schemes_are_web_urls() {
    let mut bookmark = Bookmark {
        id: "1".into(),
        owner: "u".into(),
        title: "t".into(),
        url: String::new(),
        created_at: datetime!(2025-01-01 00:00:00 UTC),
    };
    for (url, web) in [
        ("https://example.com", true),
        ("HTTP://example.com/a", true),
        ("javascript:alert(1)", false),
        (" javascript:alert(1)", false),
        ("mailto:someone@example.com", false),
        ("data:text/html,<b>x</b>", false),
    ] {
        bookmark.url = url.into();
        assert_eq!(bookmark.has_web_url(), web, "{url}");
    }
}
