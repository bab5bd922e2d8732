//! Forgiving field and object extraction for backend payloads that do not parse as JSON.
//!
//! Nothing here validates grammar. Fields are found with regexes and objects are cut out
//! by balancing braces, so truncated bodies and unexpected extra fields still yield
//! whatever can be recovered. Malformed input gives `None` or an empty list, never a panic.

use regex::Regex;

/// Value of `"name": ...` anywhere in `json`.
///
/// A quoted value is preferred and unescaped; otherwise the raw token up to the next
/// `,`, `}` or `]` is returned with surrounding quotes trimmed.
pub fn extract_field(json: &str, name: &str) -> Option<String> {
    let key = regex::escape(name);
    let quoted = Regex::new(&format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, key)).ok()?;
    if let Some(c) = quoted.captures(json) {
        return c.get(1).map(|m| unescape(m.as_str()));
    }
    let bare = Regex::new(&format!(r#""{}"\s*:\s*([^,}}\]]+)"#, key)).ok()?;
    let raw = bare.captures(json)?.get(1)?.as_str().trim();
    let raw = raw.strip_prefix('"').unwrap_or(raw);
    let raw = raw.strip_suffix('"').unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }
    Some(raw.to_string())
}

/// Every `"key": <unsigned integer>` pair, in document order.
pub fn extract_integer_fields(json: &str) -> Vec<(String, u64)> {
    let re = match Regex::new(r#""([^"]+)"\s*:\s*(\d+)"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    re.captures_iter(json)
        .filter_map(|c| {
            let n = c.get(2)?.as_str().parse().ok()?;
            Some((c.get(1)?.as_str().to_string(), n))
        })
        .collect()
}

/// Split the inside of an array into its top-level `{...}` elements.
///
/// Braces inside string literals are ignored; anything between elements is dropped.
pub fn split_array_objects(array_body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in array_body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        out.push(array_body[s..=i].trim().to_string());
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Objects of the array that follows the first `"key"`.
///
/// The array is taken to end at the last `]` of the whole payload, which is only right
/// when the keyed array is the last array in the document.
pub fn extract_objects_under_key(json: &str, key: &str) -> Vec<String> {
    match array_body_under_key(json, key) {
        Some(body) => split_array_objects(body),
        None => Vec::new(),
    }
}

/// Raw text between the `[` following `"key"` and the last `]` in `json`.
pub fn array_body_under_key<'a>(json: &'a str, key: &str) -> Option<&'a str> {
    let key_at = json.find(&format!("\"{}\"", key))?;
    let open = key_at + json[key_at..].find('[')?;
    let close = json.rfind(']')?;
    if close <= open {
        return None;
    }
    Some(&json[open + 1..close])
}

/// Quoted strings of a string-only array body, unescaped.
pub fn split_string_array(array_body: &str) -> Vec<String> {
    let re = match Regex::new(r#""((?:[^"\\]|\\.)*)""#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    re.captures_iter(array_body)
        .filter_map(|c| c.get(1).map(|m| unescape(m.as_str())))
        .filter(|s| !s.is_empty())
        .collect()
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_field_with_escapes() {
        let json = r#"{"name":"Jane \"J\" Doe","email":"j@x.com"}"#;
        assert_eq!(extract_field(json, "name").as_deref(), Some(r#"Jane "J" Doe"#));
        assert_eq!(extract_field(json, "email").as_deref(), Some("j@x.com"));
        assert_eq!(extract_field(r#"{"p":"a\\b\tc\nd"}"#, "p").as_deref(), Some("a\\b\tc\nd"));
    }

    #[test]
    fn numeric_and_bare_fields() {
        let json = r#"{"JsScan": 42, "active":true ,"ratio":0.5}"#;
        assert_eq!(extract_field(json, "JsScan").as_deref(), Some("42"));
        assert_eq!(extract_field(json, "active").as_deref(), Some("true"));
        assert_eq!(extract_field(json, "ratio").as_deref(), Some("0.5"));
        assert_eq!(extract_field(json, "missing"), None);
    }

    #[test]
    fn field_names_are_literal() {
        let json = r#"{"a.b":"dot","axb":"other"}"#;
        assert_eq!(extract_field(json, "a.b").as_deref(), Some("dot"));
    }

    #[test]
    fn malformed_input_is_harmless() {
        assert_eq!(extract_field("", "name"), None);
        assert_eq!(extract_field(r#"{"name": "#, "name"), None);
        assert!(split_array_objects("}}{").is_empty());
        assert!(extract_objects_under_key("garbage", "data").is_empty());
        assert!(extract_objects_under_key(r#"]"data": ["#, "data").is_empty());
    }

    #[test]
    fn split_two_objects() {
        let v = split_array_objects(r#"{"a":1},{"b":2}"#);
        assert_eq!(v, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn split_nested_and_quoted_braces() {
        let v = split_array_objects(r#" {"a":{"x":[1,2]}} , {"s":"not } a brace"} "#);
        assert_eq!(v.len(), 2);
        assert_eq!(v[0], r#"{"a":{"x":[1,2]}}"#);
        assert_eq!(extract_field(&v[1], "s").as_deref(), Some("not } a brace"));
    }

    #[test]
    fn objects_under_key() {
        let json = r#"{"status":"ok","data":[{"value":"https://a/x.js"},{"value":"https://a/y.js"}]}"#;
        let v = extract_objects_under_key(json, "data");
        assert_eq!(v.len(), 2);
        assert_eq!(extract_field(&v[1], "value").as_deref(), Some("https://a/y.js"));
    }

    #[test]
    fn integer_pairs() {
        let v = extract_integer_fields(r#"{"totalJsUrls": 250, "name":"x", "totalUrls":0}"#);
        assert_eq!(v, vec![("totalJsUrls".to_string(), 250), ("totalUrls".to_string(), 0)]);
    }

    #[test]
    fn string_array() {
        let body = array_body_under_key(r#"{"data":["a.example","b.example"]}"#, "data").unwrap();
        assert_eq!(split_string_array(body), vec!["a.example", "b.example"]);
    }
}
