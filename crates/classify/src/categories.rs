use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// One quoted string at the head of the remaining list body, plus its separator.
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*(?:,|$)"#)
        .expect("list item pattern is valid")
});

/// The closed set of labels a caller allows for one receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCategories {
    labels: Vec<String>,
}

impl AllowedCategories {
    /// Decode the categories as they arrive on the wire.
    ///
    /// A single value is an encoded list, either a JSON array or a list literal
    /// with single- or double-quoted strings. Several values are the labels
    /// themselves. Returns `None` when nothing usable comes out.
    pub fn decode(raw: &[String]) -> Option<Self> {
        let labels = match raw {
            [] => return None,
            [encoded] => decode_list(encoded)?,
            many => many.to_vec(),
        };

        let labels: Vec<String> = labels
            .into_iter()
            .filter(|label| !label.trim().is_empty())
            .collect();

        if labels.is_empty() {
            None
        } else {
            Some(Self { labels })
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Match a provider answer against the allowed labels, ignoring case and
    /// surrounding whitespace. The accepted form is the lower-cased answer.
    pub fn accept(&self, answer: &str) -> Option<String> {
        let answer = answer.trim().to_lowercase();
        self.labels
            .iter()
            .any(|label| label.trim().to_lowercase() == answer)
            .then_some(answer)
    }

    /// Render as a list literal, e.g. `['Food', 'Other']`.
    pub fn to_list_literal(&self) -> String {
        let quoted: Vec<String> = self
            .labels
            .iter()
            .map(|label| format!("'{}'", label.replace('\\', "\\\\").replace('\'', "\\'")))
            .collect();
        format!("[{}]", quoted.join(", "))
    }
}

fn decode_list(encoded: &str) -> Option<Vec<String>> {
    let encoded = encoded.trim();

    if let Ok(value) = serde_json::from_str::<Value>(encoded) {
        return match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => None,
        };
    }

    let mut rest = encoded.strip_prefix('[')?.strip_suffix(']')?;
    let mut labels = Vec::new();

    while !rest.trim().is_empty() {
        let caps = LIST_ITEM.captures(rest)?;
        let body = caps.get(1).or_else(|| caps.get(2))?.as_str();
        labels.push(unescape(body));
        rest = &rest[caps.get(0)?.end()..];
    }

    Some(labels)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_decodes_list_literal() {
        let allowed = AllowedCategories::decode(&raw(&["['Food', 'Transport', \"Kids' Stuff\"]"]))
            .unwrap();
        assert_eq!(allowed.labels(), ["Food", "Transport", "Kids' Stuff"]);

        let escaped = AllowedCategories::decode(&raw(&[r"['Kid\'s', 'Other',]"])).unwrap();
        assert_eq!(escaped.labels(), ["Kid's", "Other"]);
    }

    #[test]
    fn test_decodes_json_array() {
        let allowed = AllowedCategories::decode(&raw(&[r#"["Food","Other"]"#])).unwrap();
        assert_eq!(allowed.labels(), ["Food", "Other"]);
    }

    #[test]
    fn test_several_values_are_labels() {
        let allowed = AllowedCategories::decode(&raw(&["Food", "Other"])).unwrap();
        assert_eq!(allowed.labels(), ["Food", "Other"]);
    }

    #[test]
    fn test_rejects_non_lists() {
        assert!(AllowedCategories::decode(&[]).is_none());
        assert!(AllowedCategories::decode(&raw(&["Food"])).is_none());
        assert!(AllowedCategories::decode(&raw(&["\"Food\""])).is_none());
        assert!(AllowedCategories::decode(&raw(&["42"])).is_none());
        assert!(AllowedCategories::decode(&raw(&[r#"{"a": "b"}"#])).is_none());
        assert!(AllowedCategories::decode(&raw(&["[1, 2]"])).is_none());
        assert!(AllowedCategories::decode(&raw(&["['Food' 'Other']"])).is_none());
        assert!(AllowedCategories::decode(&raw(&["['Food'"])).is_none());
        assert!(AllowedCategories::decode(&raw(&["[]"])).is_none());
    }

    #[test]
    fn test_accept_is_case_insensitive() {
        let allowed = AllowedCategories::decode(&raw(&["Food", " Transport "])).unwrap();

        assert_eq!(allowed.accept("  FOOD\n"), Some("food".to_string()));
        assert_eq!(allowed.accept("transport"), Some("transport".to_string()));
        assert_eq!(allowed.accept("groceries"), None);
        assert_eq!(allowed.accept(""), None);
    }

    #[test]
    fn test_list_literal() {
        let allowed = AllowedCategories::decode(&raw(&["Food", "Kid's"])).unwrap();
        assert_eq!(allowed.to_list_literal(), r"['Food', 'Kid\'s']");
    }
}
