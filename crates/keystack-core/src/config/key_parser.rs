// Keystack Config API - Key String Parser
// Parses key strings like "Cmd-Shift-h" into modifiers and a host key code

use crate::{KeyCode, Modifier};

/// Result of parsing a key string
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedKey {
    /// The modifiers parsed from the string (in order, deduplicated)
    pub modifiers: Vec<Modifier>,
    /// The key (the last component after hyphens)
    pub key: KeyCode,
}

/// Errors that can occur during key string parsing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KeyParseError {
    #[error("key string cannot be empty")]
    EmptyInput,

    #[error("unknown modifier: '{0}'")]
    UnknownModifier(String),

    #[error("key string cannot end with hyphen")]
    TrailingHyphen,

    #[error("key string has an empty component: '{0}'")]
    EmptyComponent(String),
}

/// Parse a key string like "Cmd-Shift-h" into modifiers and key
///
/// Host key names never contain hyphens (`left_arrow`, `hyphen`,
/// `return_or_enter`), so every component before the last one is a modifier.
///
/// # Examples
/// ```
/// use keystack_core::config::parse_key_string;
/// use keystack_core::Modifier;
/// let parsed = parse_key_string("Cmd-h").unwrap();
/// assert_eq!(parsed.modifiers, vec![Modifier::Command]);
/// assert_eq!(parsed.key.name(), "h");
/// ```
pub fn parse_key_string(exp: &str) -> Result<ParsedKey, KeyParseError> {
    let trimmed = exp.trim();
    if trimmed.is_empty() {
        return Err(KeyParseError::EmptyInput);
    }

    if trimmed.ends_with('-') {
        return Err(KeyParseError::TrailingHyphen);
    }

    let parts: Vec<&str> = trimmed.split('-').map(str::trim).collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(KeyParseError::EmptyComponent(trimmed.to_string()));
    }

    let (key, modifier_parts) = match parts.split_last() {
        Some((key, rest)) => (*key, rest),
        None => return Err(KeyParseError::EmptyInput),
    };

    let mut modifiers = Vec::with_capacity(modifier_parts.len());
    for part in modifier_parts {
        let modifier = Modifier::from_alias(part)
            .ok_or_else(|| KeyParseError::UnknownModifier(part.to_string()))?;
        if !modifiers.contains(&modifier) {
            modifiers.push(modifier);
        }
    }

    Ok(ParsedKey {
        modifiers,
        key: KeyCode::new(key),
    })
}
