//! Minimal HTML cleanup for free-text cells: entity decoding and tag
//! stripping. Covers the entities that actually occur in clinical exports;
//! anything unrecognised is left as-is rather than guessed at.

use std::sync::OnceLock;

use regex::Regex;

/// Decode character entities: the common named set plus numeric references.
pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find(';') {
            Some(end) if end <= 32 => {
                let entity = &tail[1..end];
                match decode_entity(entity) {
                    Some(decoded) => {
                        out.push_str(&decoded);
                        rest = &tail[end + 1..];
                    }
                    None => {
                        out.push('&');
                        rest = &tail[1..];
                    }
                }
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<String> {
    let named = match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    };
    if let Some(c) = named {
        return Some(c.to_string());
    }
    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()?
    } else {
        return None;
    };
    char::from_u32(code).map(|c| c.to_string())
}

/// Remove markup tags, leaving the text content.
pub fn untag(text: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"</?[A-Za-z][^>]*>|<!--.*?-->").unwrap());
    tag.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_named_and_numeric() {
        assert_eq!(unescape("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(unescape("a &lt;b&gt; c"), "a <b> c");
        assert_eq!(unescape("caf&#233;"), "café");
        assert_eq!(unescape("caf&#xE9;"), "café");
    }

    #[test]
    fn unescape_leaves_unknown_entities() {
        assert_eq!(unescape("AT&T; &bogus; &"), "AT&T; &bogus; &");
    }

    #[test]
    fn untag_strips_elements_and_comments() {
        assert_eq!(
            untag("<p>Seen <b>today</b>.</p><!-- note -->"),
            "Seen today."
        );
    }

    #[test]
    fn untag_keeps_comparison_operators() {
        assert_eq!(untag("BP < 120 and HR > 60"), "BP < 120 and HR > 60");
    }
}
