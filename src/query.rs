//! Percent-decoding query-string parser.
//!
//! Multi-value aware: duplicate keys are kept in order. Values containing
//! `=` survive (only the first `=` splits), `+` decodes to a space, and a
//! key without `=` becomes a key with an empty value.

use std::borrow::Cow;

pub fn parse(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode(k), decode(v)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

/// First value for `key`, if any.
pub fn first<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn decode(component: &str) -> String {
    let plus_fixed: Cow<'_, str> = if component.contains('+') {
        Cow::Owned(component.replace('+', " "))
    } else {
        Cow::Borrowed(component)
    };
    let bytes = urlencoding::decode_binary(plus_fixed.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_pairs() {
        let pairs = parse("foo=bar&baz=123");
        assert_eq!(pairs, vec![
            ("foo".to_string(), "bar".to_string()),
            ("baz".to_string(), "123".to_string()),
        ]);
    }

    #[test]
    fn value_may_contain_equals() {
        let pairs = parse("expr=a=b&next=1");
        assert_eq!(first(&pairs, "expr"), Some("a=b"));
        assert_eq!(first(&pairs, "next"), Some("1"));
    }

    #[test]
    fn percent_and_plus_decode() {
        let pairs = parse("q=hello+world&path=%2Fnew-page&amp=%26");
        assert_eq!(first(&pairs, "q"), Some("hello world"));
        assert_eq!(first(&pairs, "path"), Some("/new-page"));
        assert_eq!(first(&pairs, "amp"), Some("&"));
    }

    #[test]
    fn duplicate_keys_kept_in_order() {
        let pairs = parse("tag=a&tag=b&tag=c");
        let tags: Vec<&str> = pairs
            .iter()
            .filter(|(k, _)| k == "tag")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn valueless_and_empty_pairs() {
        let pairs = parse("flag&&x=1");
        assert_eq!(pairs, vec![
            ("flag".to_string(), String::new()),
            ("x".to_string(), "1".to_string()),
        ]);
        assert!(parse("").is_empty());
    }
}
