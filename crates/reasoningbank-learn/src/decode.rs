//! Lenient decoding of JSON embedded in model replies.
//!
//! Models wrap JSON in code fences or surround it with prose. The first
//! fenced block wins when present; otherwise the outermost span between the
//! requested delimiters is parsed.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;

fn fence() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").ok())
        .as_ref()
}

/// Body of the first fenced code block, or the whole reply.
pub(crate) fn fenced_body(reply: &str) -> &str {
    fence()
        .and_then(|re| re.captures(reply))
        .and_then(|caps| caps.get(1))
        .map_or(reply, |m| m.as_str())
}

/// Decode `T` from `reply`, falling back to the span `open..=close`.
pub(crate) fn decode<T: DeserializeOwned>(
    reply: &str,
    open: char,
    close: char,
) -> Result<T, String> {
    let body = fenced_body(reply).trim();
    if let Ok(value) = serde_json::from_str(body) {
        return Ok(value);
    }
    let start = body
        .find(open)
        .ok_or_else(|| format!("no '{open}' in reply"))?;
    let end = body
        .rfind(close)
        .filter(|&end| end > start)
        .ok_or_else(|| format!("no closing '{close}' in reply"))?;
    serde_json::from_str(&body[start..=end]).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_fenced_block_wins() {
        let reply = "Here you go:\n```json\n{\"a\": 1}\n```\nand {\"b\": 2}";
        assert_eq!(fenced_body(reply).trim(), "{\"a\": 1}");
        let v: Value = decode(reply, '{', '}').unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_prose_around_object() {
        let v: Value = decode("Verdict: {\"success\": true} done.", '{', '}').unwrap();
        assert_eq!(v["success"], true);
    }

    #[test]
    fn test_array_span() {
        let v: Vec<u8> = decode("items: [1, 2, 3] (three)", '[', ']').unwrap();
        assert_eq!(v, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_delimiters() {
        assert!(decode::<Value>("no json here", '{', '}').is_err());
        assert!(decode::<Value>("} backwards {", '{', '}').is_err());
    }
}
