//! Decoder for free-form model replies.
//!
//! Replies are supposed to look like `speech|action [action]|attack=<target>`
//! but models drift: they wrap output in Markdown fences, use `+` instead of
//! `|`, or answer in prose. [`decode_directive`] tries progressively looser
//! stages and reports which one succeeded:
//!
//! 1. [`parse_strict`] on the normalized text.
//! 2. [`parse_strict`] again after [`resync_separators`], when the text has no `|`.
//! 3. [`parse_lenient`], which salvages speech and one action.
//!
//! Whatever survives is checked against the [`Action`] vocabulary; an
//! unknown token replaces the whole list with [`Action::Idle`]. The pipeline
//! is pure: no I/O, no logging, no shared state.

mod lenient;
mod strict;

use std::fmt::{Display, Formatter};

pub use lenient::{attack_target_hint, parse_lenient, LenientParse};
pub use strict::{parse_strict, resync_separators, StrictError, StrictParse, MAX_ACTIONS};

use crate::models::{Action, ParsedDirective};
use crate::IntentError;

/// Warning attached when only the lenient stage matched.
pub const LENIENT_WARNING: &str = "used lenient parsing";

/// Warning attached when a token outside the vocabulary forced `idle`.
pub const UNKNOWN_ACTION_WARNING: &str = "action token not in allowed list; using idle";

/// Stage that produced a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    /// Matched the strict grammar as written.
    Strict,
    /// Matched the strict grammar after `+` separators were rewritten.
    Resynced,
    /// Recovered by the lenient scan.
    Lenient,
}

/// Directive plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDirective {
    /// Validated directive.
    pub directive: ParsedDirective,
    /// Stage that matched.
    pub stage: ParseStage,
    /// Non-fatal problems worth surfacing in debug output.
    pub warnings: Vec<String>,
}

/// Every stage failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// First strict-stage error, which best describes what the model got wrong.
    pub reason: StrictError,
}

impl Display for ParseFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "could not decode directive: {}", self.reason)
    }
}

impl std::error::Error for ParseFailure {}

impl From<ParseFailure> for IntentError {
    fn from(err: ParseFailure) -> Self {
        Self::Parse(format!("could not decode directive: {}", err.reason))
    }
}

/// Drop Markdown fence lines and trim the result.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

/// Run the full pipeline over one reply.
///
/// # Errors
///
/// Returns [`ParseFailure`] when not even speech could be recovered.
pub fn decode_directive(text: &str) -> Result<DecodedDirective, ParseFailure> {
    let text = normalize(text);
    let mut warnings = Vec::new();

    let (candidate, stage) = match parse_strict(&text) {
        Ok(parsed) => (parsed, ParseStage::Strict),
        Err(reason) => {
            if let Some(parsed) = resync_separators(&text).and_then(|t| parse_strict(&t).ok()) {
                (parsed, ParseStage::Resynced)
            } else if let Some(lenient) = parse_lenient(&text) {
                warnings.push(LENIENT_WARNING.to_owned());
                let candidate = StrictParse {
                    speech: lenient.speech,
                    tokens: vec![lenient.action.as_str().to_owned()],
                    attack_target: None,
                    pickup_targets: Vec::new(),
                };
                (candidate, ParseStage::Lenient)
            } else {
                return Err(ParseFailure { reason });
            }
        }
    };

    let actions = candidate
        .tokens
        .iter()
        .map(|token| token.parse::<Action>().ok())
        .collect::<Option<Vec<_>>>()
        .unwrap_or_else(|| {
            warnings.push(UNKNOWN_ACTION_WARNING.to_owned());
            vec![Action::Idle]
        });

    let attack_target = candidate
        .attack_target
        .or_else(|| attack_target_hint(&text));

    Ok(DecodedDirective {
        directive: ParsedDirective {
            speech: candidate.speech,
            actions,
            attack_target,
            pickup_targets: candidate.pickup_targets,
        },
        stage,
        warnings,
    })
}
