//! Unit tests for the directive parser pipeline.
//!
//! Covers the strict grammar and each of its failure reasons, `+`
//! resynchronization, lenient recovery, vocabulary post-validation, and
//! attack-target recovery.

use npc_intent::models::Action;
use npc_intent::parser::{
    attack_target_hint, decode_directive, normalize, parse_lenient, parse_strict,
    resync_separators, ParseStage, StrictError, LENIENT_WARNING, UNKNOWN_ACTION_WARNING,
};
use npc_intent::IntentError;

// ── Strict stage ────────────────────────────────────────────────────────────

#[test]
fn strict_reply_with_three_actions() {
    let decoded = decode_directive("On my way.|follow_player|equip_gun|look_around")
        .expect("strict reply");

    assert_eq!(decoded.stage, ParseStage::Strict);
    assert_eq!(decoded.directive.speech, "On my way.");
    assert_eq!(
        decoded.directive.actions,
        vec![Action::FollowPlayer, Action::EquipGun, Action::LookAround]
    );
    assert_eq!(decoded.directive.attack_target, None);
    assert!(decoded.warnings.is_empty());
}

#[test]
fn single_idle_action() {
    let decoded = decode_directive("Blow me.|idle").expect("strict reply");

    assert_eq!(decoded.directive.speech, "Blow me.");
    assert_eq!(decoded.directive.actions, vec![Action::Idle]);
    assert_eq!(decoded.directive.attack_target, None);
}

#[test]
fn attack_target_in_last_field() {
    let decoded = decode_directive("Lets put those fucks in the ground.|equip_melee|attack=zombie")
        .expect("strict reply");

    assert_eq!(decoded.stage, ParseStage::Strict);
    assert_eq!(decoded.directive.actions, vec![Action::EquipMelee]);
    assert_eq!(decoded.directive.attack_target.as_deref(), Some("zombie"));
}

#[test]
fn attack_target_position_does_not_matter() {
    for text in [
        "Die!|attack=zombie equip_gun",
        "Die!|equip_gun attack=zombie",
        "Die!|attack=zombie|equip_gun",
    ] {
        let decoded = decode_directive(text).expect(text);
        assert_eq!(decoded.directive.attack_target.as_deref(), Some("zombie"), "{text}");
        assert_eq!(decoded.directive.actions, vec![Action::EquipGun], "{text}");
    }
}

#[test]
fn target_only_implies_idle() {
    let parsed = parse_strict("Get it.|attack=feral_dog").expect("target alone is enough");
    assert_eq!(parsed.tokens, vec!["idle"]);
    assert_eq!(parsed.attack_target.as_deref(), Some("feral_dog"));
}

#[test]
fn target_value_keeps_leading_token_run() {
    let parsed = parse_strict("Go.|attack=Zombie_Brute,").expect("strict");
    assert_eq!(parsed.attack_target.as_deref(), Some("zombie_brute"));
}

#[test]
fn words_after_target_are_dropped_as_spillover() {
    let parsed = parse_strict("Kill it.|equip_bow attack=giant rat").expect("strict");
    assert_eq!(parsed.tokens, vec!["equip_bow"]);
    assert_eq!(parsed.attack_target.as_deref(), Some("giant"));
}

#[test]
fn quoted_and_upper_case_tokens_are_normalized() {
    let parsed = parse_strict("Fine.|\"WAIT_HERE\" Look_Around").expect("strict");
    assert_eq!(parsed.tokens, vec!["wait_here", "look_around"]);
}

#[test]
fn fenced_output_is_unwrapped() {
    let decoded = decode_directive("```text\nHold on.|wait_here\n```").expect("fenced reply");
    assert_eq!(decoded.stage, ParseStage::Strict);
    assert_eq!(decoded.directive.speech, "Hold on.");
    assert_eq!(decoded.directive.actions, vec![Action::WaitHere]);
}

#[test]
fn normalize_drops_fence_lines_only() {
    assert_eq!(normalize("  ```\na|idle\n  ```  \n"), "a|idle");
    assert_eq!(normalize("line one\nline two"), "line one\nline two");
}

#[test]
fn pickup_tokens_are_collected_once() {
    let parsed = parse_strict("Mine.|idle|pickup=rope pickup=Rope pickup=knife").expect("strict");
    assert_eq!(parsed.pickup_targets, vec!["rope", "knife"]);
    assert_eq!(parsed.tokens, vec!["idle"]);
}

// ── Strict failure reasons ──────────────────────────────────────────────────

#[test]
fn strict_failures_have_distinct_reasons() {
    let cases = [
        ("no separator here", StrictError::MissingSeparator),
        ("a|idle|idle|idle|idle", StrictError::TooManyFields),
        ("  |idle", StrictError::MissingSpeech),
        ("Hi.| |idle", StrictError::EmptyField),
        ("Hi.|go-now", StrictError::InvalidToken("go-now".into())),
        ("Hi.|attack=", StrictError::MissingTarget),
        ("Hi.|attack=-rat", StrictError::InvalidTarget("-rat".into())),
        ("Hi.|attack=rat attack=dog", StrictError::RepeatedTarget),
        ("Hi.|pickup=", StrictError::InvalidPickup(String::new())),
        ("Hi.|idle idle idle idle", StrictError::TooManyActions),
    ];
    for (text, expected) in cases {
        assert_eq!(parse_strict(text), Err(expected), "{text}");
    }
}

#[test]
fn strict_errors_display_reasons() {
    assert_eq!(StrictError::RepeatedTarget.to_string(), "attack target repeated");
    assert!(StrictError::MissingSeparator.to_string().contains('|'));
}

// ── Resync stage ────────────────────────────────────────────────────────────

#[test]
fn plus_separators_are_resynced() {
    assert_eq!(resync_separators("Hi.++idle+wait_here").as_deref(), Some("Hi.|idle|wait_here"));
    assert_eq!(resync_separators("Hi.|idle+x"), None);
    assert_eq!(resync_separators("Hi."), None);

    let decoded = decode_directive("Coming.+follow_player").expect("resynced");
    assert_eq!(decoded.stage, ParseStage::Resynced);
    assert_eq!(decoded.directive.actions, vec![Action::FollowPlayer]);
}

// ── Lenient stage ───────────────────────────────────────────────────────────

#[test]
fn repeated_target_falls_back_to_lenient_with_vocabulary_action() {
    let decoded = decode_directive("Go.|equip_gun attack=zombie attack=dog").expect("lenient");

    assert_eq!(decoded.stage, ParseStage::Lenient);
    assert_eq!(decoded.directive.speech, "Go.");
    assert_eq!(decoded.directive.actions, vec![Action::EquipGun]);
    assert_eq!(decoded.directive.attack_target.as_deref(), Some("zombie"));
    assert_eq!(decoded.warnings, vec![LENIENT_WARNING.to_owned()]);
}

#[test]
fn repeated_target_without_vocabulary_defaults_to_idle() {
    let decoded = decode_directive("Go.|attack=zombie attack=dog").expect("lenient");
    assert_eq!(decoded.stage, ParseStage::Lenient);
    assert_eq!(decoded.directive.actions, vec![Action::Idle]);
}

#[test]
fn lenient_takes_first_quoted_span() {
    let parsed = parse_lenient(r#"NPC says "Stay ""sharp"" now" then wait_here"#).expect("speech");
    assert_eq!(parsed.speech, r#"Stay "sharp" now"#);
    assert_eq!(parsed.action, Action::WaitHere);
}

#[test]
fn lenient_requires_whole_word_matches() {
    let parsed = parse_lenient(r#""Hm." I am idle_ish and idler"#).expect("speech");
    assert_eq!(parsed.action, Action::Idle, "no whole-word hit, so the default applies");

    let parsed = parse_lenient(r#""Hm." EQUIP_BOW, then idle"#).expect("speech");
    assert_eq!(parsed.action, Action::EquipBow);
}

#[test]
fn lenient_prefers_declaration_order() {
    let parsed = parse_lenient(r#""Ok." idle, look_around, wait_here"#).expect("speech");
    assert_eq!(parsed.action, Action::WaitHere);
}

#[test]
fn lenient_fails_without_speech() {
    assert_eq!(parse_lenient("just prose, idle"), None);
    assert_eq!(parse_lenient(r#"empty quotes "" here"#), None);
}

// ── Post-validation ─────────────────────────────────────────────────────────

#[test]
fn unknown_token_replaces_list_with_idle() {
    let decoded = decode_directive("Let's dance.|dance follow_player").expect("strict grammar");

    assert_eq!(decoded.stage, ParseStage::Strict);
    assert_eq!(decoded.directive.actions, vec![Action::Idle]);
    assert_eq!(decoded.warnings, vec![UNKNOWN_ACTION_WARNING.to_owned()]);
}

#[test]
fn target_recovered_by_hint_scan() {
    assert_eq!(attack_target_hint("blah ATTACK=Raider now"), Some("raider".into()));
    assert_eq!(attack_target_hint("no target"), None);

    let decoded = decode_directive(r#""Die." use attack=bandit"#).expect("lenient");
    assert_eq!(decoded.directive.attack_target.as_deref(), Some("bandit"));
}

#[test]
fn total_failure_reports_first_strict_reason() {
    let failure = decode_directive("nothing useful here").expect_err("no speech anywhere");
    assert_eq!(failure.reason, StrictError::MissingSeparator);

    let err: IntentError = failure.into();
    assert!(err.to_string().starts_with("parse: could not decode directive"));
}

#[test]
fn parser_is_pure() {
    let text = "Careful.|look_around attack=wolf";
    assert_eq!(decode_directive(text), decode_directive(text));
}
