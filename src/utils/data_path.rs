use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parses `a.b`, `a[0].b` and `a.0.b` style accessors. Empty segments are dropped.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    for ch in path.trim().chars() {
        match ch {
            '.' if !in_brackets => {
                if !current.trim().is_empty() {
                    segments.push(segment_from(&current));
                }
                current.clear();
            }
            '[' => {
                if !current.trim().is_empty() {
                    segments.push(segment_from(&current));
                    current.clear();
                }
                in_brackets = true;
            }
            ']' => {
                if !current.trim().is_empty() {
                    segments.push(segment_from(&current));
                }
                current.clear();
                in_brackets = false;
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        segments.push(segment_from(&current));
    }
    segments
}

fn segment_from(raw: &str) -> PathSegment {
    let trimmed = raw.trim().trim_matches('"').trim_matches('\'').trim();
    if let Ok(index) = trimmed.parse::<usize>() {
        return PathSegment::Index(index);
    }
    PathSegment::Key(trimmed.to_string())
}

/// Walks `path` into `target`. Objects are indexed by key (numeric segments
/// included, so `{"0": ..}` resolves), arrays by position. `None` on any
/// missing segment.
pub fn lookup_path<'a>(target: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path);
    if segments.is_empty() {
        return None;
    }
    let mut current = target;
    for segment in segments.iter() {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_mixed_segments() {
        assert_eq!(
            parse_path("data.items[1].url"),
            vec![
                PathSegment::Key("data".into()),
                PathSegment::Key("items".into()),
                PathSegment::Index(1),
                PathSegment::Key("url".into()),
            ]
        );
    }

    #[test]
    fn looks_up_nested_values() {
        let doc = json!({"data": {"items": [{"url": "a"}, {"url": "b"}]}, "7": "seven"});
        assert_eq!(lookup_path(&doc, "data.items[1].url"), Some(&json!("b")));
        assert_eq!(lookup_path(&doc, "data.items.0.url"), Some(&json!("a")));
        assert_eq!(lookup_path(&doc, "7"), Some(&json!("seven")));
        assert_eq!(lookup_path(&doc, "data.missing"), None);
        assert_eq!(lookup_path(&doc, "data.items.url"), None);
        assert_eq!(lookup_path(&doc, ""), None);
    }
}
