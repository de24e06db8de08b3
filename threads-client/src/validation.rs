//! Argument checks that run before any request leaves the process.
//!
//! Every function here is pure: it either returns `Ok(())` or an [`Error::Validation`] naming
//! the offending argument.

use crate::error::{Error, Result};
use jiff::Timestamp;

/// Maximum number of characters in a post's text.
pub const MAX_TEXT_CHARS: usize = 500;

/// Maximum number of characters in an image or video's alt text.
pub const MAX_ALT_TEXT_CHARS: usize = 1000;

/// Carousel posts take between this many and [`MAX_CAROUSEL_ITEMS`] children.
pub const MIN_CAROUSEL_ITEMS: usize = 2;
pub const MAX_CAROUSEL_ITEMS: usize = 20;

/// Largest page size accepted by list endpoints.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Earliest timestamp the API accepts for `since`/`until` filters (2023-07-05).
pub const EARLIEST_TIMESTAMP_SECS: i64 = 1_688_540_400;

pub fn require_non_blank(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Rejects identifiers that are blank or could change the request path.
pub fn require_id(field: &'static str, value: &str) -> Result<()> {
    require_non_blank(field, value)?;
    if value.contains(['/', '?', '#']) {
        return Err(Error::validation(field, "must not contain '/', '?' or '#'"));
    }
    Ok(())
}

/// Requires an absolute `http`/`https` URL.
pub fn require_url(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    let url = url::Url::parse(value)
        .map_err(|e| Error::validation(field, format!("not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::validation(
            field,
            format!("unsupported scheme '{other}', expected http or https"),
        )),
    }
}

pub fn validate_text(text: &str) -> Result<()> {
    let chars = text.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(Error::validation(
            "text",
            format!("{chars} characters exceeds the limit of {MAX_TEXT_CHARS}"),
        ));
    }
    Ok(())
}

pub fn validate_alt_text(alt_text: &str) -> Result<()> {
    let chars = alt_text.chars().count();
    if chars > MAX_ALT_TEXT_CHARS {
        return Err(Error::validation(
            "alt_text",
            format!("{chars} characters exceeds the limit of {MAX_ALT_TEXT_CHARS}"),
        ));
    }
    Ok(())
}

/// Checks that `value` lies within `min..=max`.
pub fn validate_limit(field: &'static str, value: u32, min: u32, max: u32) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(Error::validation(
            field,
            format!("{value} is outside the allowed range {min}..={max}"),
        ));
    }
    Ok(())
}

/// Checks a `since`/`until` window against `now`.
///
/// Either bound may be absent. Present bounds must not precede
/// [`EARLIEST_TIMESTAMP_SECS`] nor lie in the future, and `since` must not be after `until`.
pub fn validate_date_range(
    since: Option<Timestamp>,
    until: Option<Timestamp>,
    now: Timestamp,
) -> Result<()> {
    for (field, bound) in [("since", since), ("until", until)] {
        let Some(bound) = bound else { continue };
        if bound.as_second() < EARLIEST_TIMESTAMP_SECS {
            return Err(Error::validation(
                field,
                format!("{bound} is before the earliest supported date (2023-07-05)"),
            ));
        }
        if bound > now {
            return Err(Error::validation(field, format!("{bound} is in the future")));
        }
    }
    if let (Some(since), Some(until)) = (since, until)
        && since > until
    {
        return Err(Error::validation("since", format!("{since} is after until ({until})")));
    }
    Ok(())
}

/// Validates the child container ids of a carousel post.
pub fn validate_carousel(children: &[String]) -> Result<()> {
    if !(MIN_CAROUSEL_ITEMS..=MAX_CAROUSEL_ITEMS).contains(&children.len()) {
        return Err(Error::validation(
            "children",
            format!(
                "carousel needs {MIN_CAROUSEL_ITEMS} to {MAX_CAROUSEL_ITEMS} items, got {}",
                children.len()
            ),
        ));
    }
    for child in children {
        require_id("children", child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn field_of(result: Result<()>) -> &'static str {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        err.field().unwrap()
    }

    #[test]
    fn blank_ids_name_their_field() {
        for blank in ["", " ", "\t", "\n  \r"] {
            assert_eq!(field_of(require_id("post_id", blank)), "post_id");
            assert_eq!(field_of(require_id("user_id", blank)), "user_id");
        }
        assert!(require_id("post_id", "17890").is_ok());
    }

    #[test]
    fn ids_cannot_escape_the_path() {
        assert_eq!(field_of(require_id("post_id", "1/threads")), "post_id");
        assert_eq!(field_of(require_id("post_id", "1?fields=x")), "post_id");
    }

    #[test]
    fn urls() {
        assert_eq!(field_of(require_url("media_url", "")), "media_url");
        assert_eq!(field_of(require_url("media_url", "not a url")), "media_url");
        assert_eq!(
            field_of(require_url("media_url", "ftp://example.com/a.png")),
            "media_url"
        );
        assert!(require_url("media_url", "https://example.com/a.png").is_ok());
    }

    #[test]
    fn text_limits_count_characters_not_bytes() {
        assert!(validate_text(&"é".repeat(MAX_TEXT_CHARS)).is_ok());
        assert_eq!(field_of(validate_text(&"a".repeat(MAX_TEXT_CHARS + 1))), "text");
        assert!(validate_alt_text(&"a".repeat(MAX_ALT_TEXT_CHARS)).is_ok());
        assert_eq!(
            field_of(validate_alt_text(&"a".repeat(MAX_ALT_TEXT_CHARS + 1))),
            "alt_text"
        );
    }

    #[test]
    fn limits() {
        assert!(validate_limit("limit", 1, 1, MAX_PAGE_LIMIT).is_ok());
        assert!(validate_limit("limit", 100, 1, MAX_PAGE_LIMIT).is_ok());
        assert_eq!(field_of(validate_limit("limit", 0, 1, MAX_PAGE_LIMIT)), "limit");
        assert_eq!(field_of(validate_limit("limit", 101, 1, MAX_PAGE_LIMIT)), "limit");
    }

    #[test]
    fn date_ranges() {
        let now: Timestamp = "2025-01-01T00:00:00Z".parse().unwrap();
        let early: Timestamp = "2023-01-01T00:00:00Z".parse().unwrap();
        let a: Timestamp = "2024-01-01T00:00:00Z".parse().unwrap();
        let b: Timestamp = "2024-06-01T00:00:00Z".parse().unwrap();
        let future: Timestamp = "2026-01-01T00:00:00Z".parse().unwrap();

        assert!(validate_date_range(None, None, now).is_ok());
        assert!(validate_date_range(Some(a), Some(b), now).is_ok());
        assert!(validate_date_range(Some(a), Some(a), now).is_ok());
        assert_eq!(field_of(validate_date_range(Some(b), Some(a), now)), "since");
        assert_eq!(field_of(validate_date_range(Some(early), None, now)), "since");
        assert_eq!(field_of(validate_date_range(None, Some(future), now)), "until");
    }

    #[test]
    fn carousel_bounds() {
        let ids = |n: usize| (0..n).map(|i| i.to_string()).collect::<Vec<_>>();
        assert_eq!(field_of(validate_carousel(&ids(1))), "children");
        assert!(validate_carousel(&ids(2)).is_ok());
        assert!(validate_carousel(&ids(20)).is_ok());
        assert_eq!(field_of(validate_carousel(&ids(21))), "children");
        assert_eq!(
            field_of(validate_carousel(&["1".to_string(), " ".to_string()])),
            "children"
        );
    }
}
