//! Finds `@username` tokens in draft text.
//!
//! Offsets are counted in Unicode scalar values so clients can pass the
//! caret position they see without worrying about UTF-8 byte boundaries.

use once_cell::sync::Lazy;
use regex::Regex;

static MENTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([A-Za-z0-9_.\-]+)").expect("mention pattern is valid"));

/// Characters allowed in a username.
pub fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// True when `name` is a non-empty, well-formed username.
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_username_char)
}

/// An unterminated mention the caret currently sits in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenToken {
    /// Char offset of the owning `@`.
    pub start: usize,
    /// Text between the `@` and the caret, possibly empty.
    pub token: String,
}

/// Detect an open mention token ending at `caret`.
///
/// Anchors on the last `@` at or before the caret; the token is open when
/// everything between that `@` and the caret is username characters.
pub fn open_token(text: &str, caret: usize) -> Option<OpenToken> {
    let chars: Vec<char> = text.chars().collect();
    let caret = caret.min(chars.len());

    let at = chars[..caret].iter().rposition(|c| *c == '@')?;
    let token = &chars[at + 1..caret];

    if token.iter().all(|c| is_username_char(*c)) {
        Some(OpenToken {
            start: at,
            token: token.iter().collect(),
        })
    } else {
        None
    }
}

/// All usernames mentioned in `text`, deduplicated in order of first appearance.
pub fn committed_mentions(text: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for cap in MENTION_PATTERN.captures_iter(text) {
        let name = &cap[1];
        if !seen.iter().any(|s| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_token_at_caret() {
        let text = "hello @ali";
        let token = open_token(text, text.chars().count()).unwrap();
        assert_eq!(token.start, 6);
        assert_eq!(token.token, "ali");
    }

    #[test]
    fn test_bare_at_is_open_with_empty_token() {
        let token = open_token("ping @", 6).unwrap();
        assert_eq!(token.token, "");
        assert_eq!(token.start, 5);
    }

    #[test]
    fn test_whitespace_closes_token() {
        assert_eq!(open_token("@alice hi", 9), None);
        assert_eq!(open_token("no mentions here", 5), None);
    }

    #[test]
    fn test_invalid_chars_close_token() {
        assert_eq!(open_token("@ali!", 5), None);
        assert_eq!(open_token("@ali,", 5), None);
    }

    #[test]
    fn test_caret_in_middle_uses_prefix() {
        // caret right after "@al" in "@alice"
        let token = open_token("@alice", 3).unwrap();
        assert_eq!(token.token, "al");
    }

    #[test]
    fn test_adjacent_mentions_anchor_on_last_at() {
        let text = "@bob@car";
        let token = open_token(text, 8).unwrap();
        assert_eq!(token.start, 4);
        assert_eq!(token.token, "car");
    }

    #[test]
    fn test_caret_beyond_end_is_clamped() {
        let token = open_token("@al", 99).unwrap();
        assert_eq!(token.token, "al");
    }

    #[test]
    fn test_multibyte_text_uses_char_offsets() {
        let text = "héllo @zoë";
        // "zoë" contains a non-username char, so it's not open
        assert_eq!(open_token(text, text.chars().count()), None);

        let text = "héllo @zo";
        let token = open_token(text, 9).unwrap();
        assert_eq!(token.start, 6);
        assert_eq!(token.token, "zo");
    }

    #[test]
    fn test_committed_mentions_in_order() {
        assert_eq!(
            committed_mentions("@alice @bob thanks!"),
            vec!["alice".to_string(), "bob".to_string()]
        );
    }

    #[test]
    fn test_committed_mentions_deduplicate() {
        assert_eq!(
            committed_mentions("@bob then @alice and @bob again"),
            vec!["bob".to_string(), "alice".to_string()]
        );
        assert!(committed_mentions("email me @ home").is_empty());
    }

    #[test]
    fn test_valid_username() {
        assert!(is_valid_username("jane.doe-99_x"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("jane doe"));
    }
}
