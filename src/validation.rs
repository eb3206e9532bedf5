//! Nickname and message body validation
//!
//! Pure functions, no state. Lengths are counted in characters.

use crate::error::ValidationError;
use crate::types::Nickname;

/// Validate a requested nickname.
///
/// Surrounding whitespace is trimmed. The result must be non-empty, at most
/// `max_len` characters, and consist only of `[A-Za-z0-9_-]`.
pub fn validate_nickname(raw: &str, max_len: usize) -> Result<Nickname, ValidationError> {
    let nick = raw.trim();

    if nick.is_empty() {
        return Err(ValidationError::EmptyNickname);
    }
    if nick.chars().count() > max_len {
        return Err(ValidationError::NicknameTooLong { max: max_len });
    }
    if let Some(bad) = nick.chars().find(|c| !is_nick_char(*c)) {
        return Err(ValidationError::InvalidNicknameChar(bad));
    }

    Ok(Nickname::new_unchecked(nick))
}

/// Validate and sanitize a message body.
///
/// The length limit applies to the raw text, surrounding whitespace and
/// markup included. The accepted body is `raw` with `<` and `>` stripped
/// and nothing else changed. A body that was nothing but whitespace and
/// markup characters is rejected as empty.
pub fn validate_message_body(raw: &str, max_len: usize) -> Result<String, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    if raw.chars().count() > max_len {
        return Err(ValidationError::MessageTooLong { max: max_len });
    }

    let sanitized = sanitize(raw);
    if sanitized.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    Ok(sanitized)
}

fn is_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn sanitize(body: &str) -> String {
    body.chars().filter(|c| *c != '<' && *c != '>').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nickname_trimmed() {
        let nick = validate_nickname("  alice_01 ", 20).unwrap();
        assert_eq!(nick.as_str(), "alice_01");
    }

    #[test]
    fn test_nickname_empty() {
        assert_eq!(validate_nickname("   ", 20), Err(ValidationError::EmptyNickname));
    }

    #[test]
    fn test_nickname_too_long() {
        assert!(validate_nickname("abcde", 5).is_ok());
        assert_eq!(
            validate_nickname("abcdef", 5),
            Err(ValidationError::NicknameTooLong { max: 5 })
        );
    }

    #[test]
    fn test_nickname_charset() {
        assert!(validate_nickname("Bob-the_2nd", 20).is_ok());
        assert_eq!(
            validate_nickname("<b>bob</b>", 20),
            Err(ValidationError::InvalidNicknameChar('<'))
        );
        assert_eq!(
            validate_nickname("two words", 20),
            Err(ValidationError::InvalidNicknameChar(' '))
        );
        assert_eq!(
            validate_nickname("héllo", 20),
            Err(ValidationError::InvalidNicknameChar('é'))
        );
    }

    #[test]
    fn test_message_length_boundary() {
        let at_limit = "a".repeat(500);
        let over_limit = "a".repeat(501);
        assert_eq!(validate_message_body(&at_limit, 500).unwrap().len(), 500);
        assert_eq!(
            validate_message_body(&over_limit, 500),
            Err(ValidationError::MessageTooLong { max: 500 })
        );
    }

    #[test]
    fn test_message_length_counts_surrounding_whitespace() {
        let padded = format!(" {}", "a".repeat(500));
        assert_eq!(
            validate_message_body(&padded, 500),
            Err(ValidationError::MessageTooLong { max: 500 })
        );

        let body = validate_message_body(&format!(" {} ", "a".repeat(498)), 500).unwrap();
        assert_eq!(body.chars().count(), 500);
        assert!(body.starts_with(' ') && body.ends_with(' '));
    }

    #[test]
    fn test_message_only_strips_markup() {
        assert_eq!(validate_message_body("  a <b> c\n", 20).unwrap(), "  a b c\n");
    }

    #[test]
    fn test_message_empty() {
        assert_eq!(validate_message_body(" \n\t", 500), Err(ValidationError::EmptyMessage));
    }

    #[test]
    fn test_message_sanitized_after_length_check() {
        // 9 characters before stripping, 5 after
        let body = validate_message_body("<b>hi</b>", 9).unwrap();
        assert_eq!(body, "bhi/b");
        assert_eq!(
            validate_message_body("<<<<>>>>x", 8),
            Err(ValidationError::MessageTooLong { max: 8 })
        );
    }

    #[test]
    fn test_message_only_markup_is_empty() {
        assert_eq!(validate_message_body("<> <>", 10), Err(ValidationError::EmptyMessage));
    }
}
