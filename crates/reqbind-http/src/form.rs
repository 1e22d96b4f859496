//! URL-encoded parsing and content type checks.
//!
//! Query strings and `application/x-www-form-urlencoded` bodies share one
//! parser. Repeated keys keep every value in order, so `tag=a&tag=b` yields
//! `["a", "b"]`.

use reqbind_core::ValueMap;

/// Content type records with file fields require.
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Content type records with form fields require.
pub const URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// Parses url-encoded pairs into a value map.
pub(crate) fn parse(input: &[u8]) -> Result<ValueMap, serde_urlencoded::de::Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(input)?;
    Ok(collect(pairs))
}

/// Groups pairs by key, preserving value order.
pub(crate) fn collect<I>(pairs: I) -> ValueMap
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut values = ValueMap::new();
    for (key, value) in pairs {
        values.entry(key).or_default().push(value);
    }
    values
}

fn essence(content_type: &str) -> Option<mime::Mime> {
    content_type.trim().parse::<mime::Mime>().ok()
}

/// True for `multipart/form-data`, with or without parameters.
#[must_use]
pub fn is_multipart(content_type: &str) -> bool {
    essence(content_type)
        .is_some_and(|m| m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA)
}

/// True for `application/x-www-form-urlencoded`, with or without parameters.
#[must_use]
pub fn is_urlencoded(content_type: &str) -> bool {
    essence(content_type).is_some_and(|m| {
        m.type_() == mime::APPLICATION && m.subtype() == mime::WWW_FORM_URLENCODED
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repeated_keys() {
        let values = parse(b"tag=a&page=2&tag=b").unwrap();
        assert_eq!(values["tag"], vec!["a", "b"]);
        assert_eq!(values["page"], vec!["2"]);
    }

    #[test]
    fn test_parse_decodes() {
        let values = parse(b"name=John+Doe&city=S%C3%A3o%20Paulo&empty=").unwrap();
        assert_eq!(values["name"], vec!["John Doe"]);
        assert_eq!(values["city"], vec!["São Paulo"]);
        assert_eq!(values["empty"], vec![""]);
    }

    #[test]
    fn test_parse_bracket_keys() {
        let values = parse(b"ids%5B%5D=1&ids%5B%5D=2").unwrap();
        assert_eq!(values["ids[]"], vec!["1", "2"]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse(b"").unwrap().is_empty());
    }

    #[test]
    fn test_content_types() {
        assert!(is_multipart("multipart/form-data; boundary=xyz"));
        assert!(!is_multipart("multipart/mixed; boundary=xyz"));
        assert!(is_urlencoded("application/x-www-form-urlencoded"));
        assert!(is_urlencoded("application/x-www-form-urlencoded; charset=utf-8"));
        assert!(!is_urlencoded("application/json"));
        assert!(!is_urlencoded(""));
        assert!(!is_multipart(""));
    }
}
