//! Stage 1: the pipe-delimited directive grammar.
//!
//! ```text
//! speech | field [| field [| field]]
//! field  = token (whitespace token)*
//! token  = action | attack=<target> | pickup=<item>
//! ```

use std::fmt::{Display, Formatter};

use crate::models::Action;

/// Maximum action tokens a directive may carry.
pub const MAX_ACTIONS: usize = 3;

const MIN_FIELDS: usize = 2;
const MAX_FIELDS: usize = MAX_ACTIONS + 1;
const ATTACK_PREFIX: &str = "attack=";
const PICKUP_PREFIX: &str = "pickup=";

/// Why a reply did not match the strict grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrictError {
    /// No `|` separator, so no action field.
    MissingSeparator,
    /// More than three action fields.
    TooManyFields,
    /// Speech field empty after trimming.
    MissingSpeech,
    /// An action field was empty after trimming.
    EmptyField,
    /// A token outside `[a-z0-9_]+`.
    InvalidToken(String),
    /// `attack=` with nothing after it.
    MissingTarget,
    /// `attack=` followed by a character that cannot start a target.
    InvalidTarget(String),
    /// A second `attack=` token.
    RepeatedTarget,
    /// `pickup=` with an empty or malformed item name.
    InvalidPickup(String),
    /// More than three action tokens.
    TooManyActions,
    /// Neither an action nor a target.
    NoActions,
}

impl Display for StrictError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSeparator => write!(f, "missing '|' separator before the action field"),
            Self::TooManyFields => write!(f, "more than {MAX_ACTIONS} action fields"),
            Self::MissingSpeech => write!(f, "speech field missing"),
            Self::EmptyField => write!(f, "empty action field"),
            Self::InvalidToken(token) => write!(f, "invalid action token `{token}`"),
            Self::MissingTarget => write!(f, "attack target missing"),
            Self::InvalidTarget(value) => write!(f, "invalid attack target `{value}`"),
            Self::RepeatedTarget => write!(f, "attack target repeated"),
            Self::InvalidPickup(value) => write!(f, "invalid pickup target `{value}`"),
            Self::TooManyActions => write!(f, "more than {MAX_ACTIONS} action tokens"),
            Self::NoActions => write!(f, "no action tokens"),
        }
    }
}

impl std::error::Error for StrictError {}

/// Successful strict parse.
///
/// `tokens` are grammatically valid but not yet checked against the action
/// vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrictParse {
    /// Trimmed speech field.
    pub speech: String,
    /// Lower-cased action tokens in order of appearance.
    pub tokens: Vec<String>,
    /// Target taken from the `attack=` token.
    pub attack_target: Option<String>,
    /// De-duplicated items from `pickup=` tokens.
    pub pickup_targets: Vec<String>,
}

/// Parse `text` against the strict grammar.
///
/// # Errors
///
/// Returns the first [`StrictError`] encountered; nothing is partially applied.
pub fn parse_strict(text: &str) -> Result<StrictParse, StrictError> {
    let fields: Vec<&str> = text.split('|').map(str::trim).collect();
    if fields.len() < MIN_FIELDS {
        return Err(StrictError::MissingSeparator);
    }
    if fields.len() > MAX_FIELDS {
        return Err(StrictError::TooManyFields);
    }

    let speech = fields[0];
    if speech.is_empty() {
        return Err(StrictError::MissingSpeech);
    }

    let mut parsed = StrictParse {
        speech: speech.to_owned(),
        tokens: Vec::new(),
        attack_target: None,
        pickup_targets: Vec::new(),
    };

    for field in &fields[1..] {
        if field.is_empty() {
            return Err(StrictError::EmptyField);
        }
        for raw in field.split_whitespace() {
            push_token(&mut parsed, raw)?;
        }
    }

    if parsed.tokens.is_empty() {
        if parsed.attack_target.is_none() && parsed.pickup_targets.is_empty() {
            return Err(StrictError::NoActions);
        }
        parsed.tokens.push(Action::Idle.as_str().to_owned());
    }

    Ok(parsed)
}

fn push_token(parsed: &mut StrictParse, raw: &str) -> Result<(), StrictError> {
    let token = strip_quotes(raw).to_ascii_lowercase();
    if token.is_empty() {
        return Err(StrictError::InvalidToken(raw.to_owned()));
    }

    if let Some(value) = token.strip_prefix(ATTACK_PREFIX) {
        if value.is_empty() {
            return Err(StrictError::MissingTarget);
        }
        let target = leading_token(value).ok_or_else(|| StrictError::InvalidTarget(value.to_owned()))?;
        if parsed.attack_target.is_some() {
            return Err(StrictError::RepeatedTarget);
        }
        parsed.attack_target = Some(target.to_owned());
        return Ok(());
    }

    if let Some(value) = token.strip_prefix(PICKUP_PREFIX) {
        let item = leading_token(value).ok_or_else(|| StrictError::InvalidPickup(value.to_owned()))?;
        if !parsed.pickup_targets.iter().any(|known| known == item) {
            parsed.pickup_targets.push(item.to_owned());
        }
        return Ok(());
    }

    if !is_token(&token) {
        return Err(StrictError::InvalidToken(token));
    }

    // Words trailing a target ("attack=giant rat") are part of its name.
    if token.parse::<Action>().is_err() && parsed.attack_target.is_some() {
        return Ok(());
    }

    parsed.tokens.push(token);
    if parsed.tokens.len() > MAX_ACTIONS {
        return Err(StrictError::TooManyActions);
    }
    Ok(())
}

/// Rewrite `+` separators as `|` when the text has no `|` at all.
///
/// Runs of `+` collapse to one separator. Returns `None` when the text
/// already contains `|` or has nothing to rewrite.
#[must_use]
pub fn resync_separators(text: &str) -> Option<String> {
    if text.contains('|') || !text.contains('+') {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut last_was_separator = false;
    for c in text.chars() {
        if c == '+' {
            if !last_was_separator {
                out.push('|');
                last_was_separator = true;
            }
            continue;
        }
        last_was_separator = false;
        out.push(c);
    }
    Some(out)
}

fn strip_quotes(token: &str) -> &str {
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        token[1..token.len() - 1].trim()
    } else {
        token
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
}

fn is_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(is_token_char)
}

/// Longest `[a-z0-9_]+` prefix of `value`.
fn leading_token(value: &str) -> Option<&str> {
    let end = value.find(|c: char| !is_token_char(c)).unwrap_or(value.len());
    (end > 0).then(|| &value[..end])
}
