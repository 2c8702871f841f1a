use std::collections::BTreeMap;

/// Error returned when a query string is not valid form encoding.
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("invalid %-encoding in query string: {0}")]
    InvalidPercentEncoding(String),

    #[error("malformed query string: {0}")]
    Malformed(#[from] serde_urlencoded::de::Error),
}

/// Decode a raw query string into a flat key/value mapping.
///
/// Pairs are `&`-separated and split on the first `=`; `+` decodes to a
/// space and `%XX` escapes are percent-decoded. When a key repeats the
/// last occurrence wins, so `a=1&a=2` yields `a => "2"`. Use
/// [`parse_query_multi`] to keep every value.
///
/// A `%` that does not start a two-digit hex escape is an error. Escapes
/// that decode to invalid UTF-8 are not: those bytes are replaced with
/// U+FFFD, so `n=%FF` yields `n => "\u{FFFD}"`.
pub fn parse_query(raw: &str) -> Result<BTreeMap<String, String>, QueryError> {
    Ok(pairs(raw)?.into_iter().collect())
}

/// Decode a raw query string keeping every value of repeated keys, in
/// order of appearance.
pub fn parse_query_multi(raw: &str) -> Result<BTreeMap<String, Vec<String>>, QueryError> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs(raw)? {
        params.entry(key).or_default().push(value);
    }
    Ok(params)
}

fn pairs(raw: &str) -> Result<Vec<(String, String)>, QueryError> {
    if let Some(at) = broken_escape(raw) {
        return Err(QueryError::InvalidPercentEncoding(raw[at..].to_string()));
    }
    Ok(serde_urlencoded::from_str(raw)?)
}

// Offset of the first `%` not followed by two hex digits.
fn broken_escape(raw: &str) -> Option<usize> {
    let bytes = raw.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'%')
        .map(|(at, _)| at)
        .find(|&at| {
            !matches!(bytes.get(at + 1..at + 3), Some(hex) if hex.iter().all(u8::is_ascii_hexdigit))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_pairs() {
        let params = parse_query("foo=bar&baz=qux").unwrap();
        assert_eq!(params.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(params.get("baz").map(String::as_str), Some("qux"));
    }

    #[test]
    fn empty_query_is_empty_mapping() {
        assert!(parse_query("").unwrap().is_empty());
    }

    #[test]
    fn last_repeated_key_wins() {
        let params = parse_query("a=1&a=2").unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params["a"], "2");
    }

    #[test]
    fn multi_keeps_every_value() {
        let params = parse_query_multi("a=1&b=x&a=2").unwrap();
        assert_eq!(params["a"], vec!["1".to_string(), "2".to_string()]);
        assert_eq!(params["b"], vec!["x".to_string()]);
    }

    #[test]
    fn applies_form_decoding() {
        let params = parse_query("q=hello+world&name=J%C3%BCrgen&flag&k%20ey=a%3Db").unwrap();
        assert_eq!(params["q"], "hello world");
        assert_eq!(params["name"], "J\u{fc}rgen");
        assert_eq!(params["flag"], "");
        assert_eq!(params["k ey"], "a=b");
    }

    #[test]
    fn rejects_broken_escapes() {
        assert!(matches!(
            parse_query("a=%zz"),
            Err(QueryError::InvalidPercentEncoding(rest)) if rest == "%zz"
        ));
        assert!(parse_query("a=100%").is_err());
        assert!(parse_query("a=1&b=%4").is_err());
    }

    #[test]
    fn invalid_utf8_escapes_are_replaced() {
        let params = parse_query("n=%FF&ok=%41").unwrap();
        assert_eq!(params["n"], "\u{fffd}");
        assert_eq!(params["ok"], "A");
    }
}
