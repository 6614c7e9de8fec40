//! Stage 2: best-effort recovery from replies that ignore the grammar.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Action;

static ATTACK_HINT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"attack=([a-z0-9_]+)").ok());

/// Speech and a single action salvaged from free-form text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LenientParse {
    /// Recovered speech.
    pub speech: String,
    /// First vocabulary action mentioned, or [`Action::Idle`].
    pub action: Action,
}

/// Recover speech and one action from `text`.
///
/// Speech is the text before the first `|`, or failing that the first
/// double-quoted span (`""` inside it is an escaped quote). The action is
/// the first vocabulary token, in [`Action::ALL`] order, that appears as a
/// whole word in the lower-cased text. Returns `None` when no speech can be
/// found.
#[must_use]
pub fn parse_lenient(text: &str) -> Option<LenientParse> {
    let speech = match text.split_once('|') {
        Some((head, _)) => head.trim().to_owned(),
        None => first_quoted_span(text)?,
    };
    if speech.is_empty() {
        return None;
    }

    let lowered = text.to_ascii_lowercase();
    let action = Action::ALL
        .into_iter()
        .find(|action| contains_word(&lowered, action.as_str()))
        .unwrap_or(Action::Idle);

    Some(LenientParse { speech, action })
}

/// First `attack=<target>` mention anywhere in `text`, lower-cased.
#[must_use]
pub fn attack_target_hint(text: &str) -> Option<String> {
    let regex = ATTACK_HINT.as_ref()?;
    let lowered = text.to_ascii_lowercase();
    regex
        .captures(&lowered)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

fn first_quoted_span(text: &str) -> Option<String> {
    let (_, rest) = text.split_once('"')?;
    let mut speech = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                speech.push('"');
                continue;
            }
            break;
        }
        speech.push(c);
    }
    Some(speech)
}

fn is_boundary(byte: u8) -> bool {
    !byte.is_ascii_alphanumeric() && byte != b'_'
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let bytes = haystack.as_bytes();
    haystack.match_indices(word).any(|(start, _)| {
        let end = start + word.len();
        let left = start == 0 || is_boundary(bytes[start - 1]);
        let right = end >= bytes.len() || is_boundary(bytes[end]);
        left && right
    })
}
