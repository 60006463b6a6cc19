//! End-to-end turns against a scripted transport.
//!
//! Run with: `cargo test -p narrator-core --test turn_flow`

use narrator_core::generation::ErrorKind;
use narrator_core::turn::TurnStep;
use narrator_core::{
    AbilityScores, Character, CharacterClass, ContentPolicy, FailureClass, GenerationClient,
    GenerationConfig, MockTransport, Narrator, ProviderError, SessionState,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

fn config() -> GenerationConfig {
    GenerationConfig {
        base_backoff: Duration::from_millis(5),
        ..GenerationConfig::default()
    }
}

fn narrator(mock: MockTransport) -> Narrator<MockTransport> {
    Narrator::new(GenerationClient::new(mock, config()))
}

fn fighter() -> Character {
    Character::new(
        "Thorin",
        CharacterClass::Fighter,
        AbilityScores::new(16, 12, 14, 10, 12, 8),
    )
    .with_gold(15)
}

const CELLAR_TURN: &str = r#"Sure! Here is the decision:
```json
{
  "narration_context": "The door splinters and a rat swarm pours out.",
  "skill_checks": [{"skill": "Athletics", "dc": 12}],
  "npc_actions": [{"name": "Rat swarm", "action": "bites", "damage_dice": "1d4"}],
  "inventory_changes": [{"action": "add", "name": "Rusty Key", "quantity": 1}],
  "gold_change": "-5",
  "xp_gained": 0,
  "location_change": "Cellar",
  "is_combat_start": "yes",
  "available_actions": "Fight, Flee, Climb the shelves",
}
```"#;

#[tokio::test(start_paused = true)]
async fn test_full_turn_applies_mechanics_and_session() {
    let narrator = narrator(MockTransport::new().with_response(CELLAR_TURN));
    let mut hero = fighter();
    let mut session = SessionState::new("Tavern", "Find the missing caravan");
    let hp = hero.current_hp;

    let outcome = narrator
        .take_turn_with_rng(
            "I kick open the cellar door",
            &mut hero,
            &mut session,
            ContentPolicy::Moderate,
            &mut StdRng::seed_from_u64(42),
        )
        .await
        .unwrap();

    let decision = &outcome.decision;
    assert_eq!(decision.gold_change, -5);
    assert!(decision.is_combat_start);
    assert_eq!(decision.available_actions.len(), 3);

    let report = &outcome.report;
    assert!(report.warnings.is_empty());
    assert!(report.lines[0].contains("Athletics check (DC 12)"));
    assert!(report.lines[1].starts_with("Rat swarm: 1d4"));
    assert!(report.lines.contains(&"🎒 +Rusty Key".to_string()));
    assert!(report.lines.contains(&"✨ +30 XP".to_string()));

    assert_eq!(report.old_hp, hp);
    assert_eq!(hero.current_hp, hp - report.damage_taken);
    assert!((1..=4).contains(&report.damage_taken));
    assert_eq!(hero.gold, 10);
    assert_eq!(hero.experience, 30);
    assert!(hero.item("rusty key").is_some());

    assert_eq!(session.location, "Cellar");
    assert_eq!(session.quest, "Find the missing caravan");
    assert!(session.in_combat);
    assert_eq!(session.turn_number, 1);

    let requests = narrator.client().transport().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].policy, ContentPolicy::Moderate);
    assert!(requests[0].prompt.starts_with("I kick open the cellar door"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_generation_mutates_nothing() {
    let mock = MockTransport::new().with_error(ProviderError::Status {
        status: 400,
        code: "FAILED_PRECONDITION".to_string(),
        message: "User location is not supported for the API use.".to_string(),
    });
    let narrator = narrator(mock);
    let mut hero = fighter();
    let mut session = SessionState::new("Tavern", "");
    let hero_before = hero.clone();
    let session_before = session.clone();

    let err = narrator
        .take_turn("I look around", &mut hero, &mut session, ContentPolicy::Full)
        .await
        .unwrap_err();

    assert_eq!(err.cause_class(), FailureClass::GeoRestricted);
    assert!(matches!(err.kind, ErrorKind::ProviderFatal(_)));
    assert_eq!(err.user_message("ru"), "⚠️ API недоступен из региона. Проверь GEMINI_PROXY.");
    assert_eq!(hero, hero_before);
    assert_eq!(session, session_before);
    assert_eq!(narrator.client().transport().requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_twice_mutates_nothing() {
    let mock = MockTransport::new()
        .with_response("The rats attack!")
        .with_response("Sorry, here it is: no JSON today.");
    let narrator = narrator(mock);
    let mut hero = fighter();
    let mut session = SessionState::default();
    let hero_before = hero.clone();

    let err = narrator
        .take_turn("I attack", &mut hero, &mut session, ContentPolicy::Full)
        .await
        .unwrap_err();

    assert!(matches!(err.kind, ErrorKind::DecisionParseFailed(_)));
    assert_eq!(err.user_message("en"), "⚠️ The AI gave a garbled answer. Try again.");
    assert_eq!(hero, hero_before);
    assert_eq!(session.turn_number, 0);
}

#[tokio::test(start_paused = true)]
async fn test_bad_steps_do_not_abort_turn() {
    let raw = r#"{
        "skill_checks": [{"skill": "Juggling", "dc": 10}],
        "saving_throws": [{"ability": "luck", "dc": 10}],
        "attack_target_ac": 13,
        "attack_damage_dice": "a heavy swing",
        "stat_changes": [{"stat": "gold", "delta": 7}],
        "xp_gained": 15
    }"#;
    let narrator = narrator(MockTransport::new().with_response(raw));
    let mut hero = fighter();
    let mut session = SessionState::default();

    let outcome = narrator
        .take_turn("I show off", &mut hero, &mut session, ContentPolicy::Full)
        .await
        .unwrap();

    let steps: Vec<_> = outcome.report.warnings.iter().map(|w| w.step).collect();
    assert_eq!(steps, [TurnStep::SkillCheck, TurnStep::SavingThrow, TurnStep::Attack]);
    assert_eq!(hero.gold, 22);
    assert_eq!(hero.experience, 15);
    assert_eq!(session.turn_number, 1);
}

#[tokio::test(start_paused = true)]
async fn test_narrate_falls_back_to_context() {
    let mock = MockTransport::new()
        .with_response(r#"{"narration_context": "The candle gutters out."}"#)
        .with_error(ProviderError::Blocked("SAFETY".to_string()))
        .with_error(ProviderError::Blocked("SAFETY".to_string()));
    let narrator = narrator(mock);
    let mut hero = fighter();
    let mut session = SessionState::default();

    let outcome = narrator
        .take_turn("I wait", &mut hero, &mut session, ContentPolicy::Family)
        .await
        .unwrap();
    assert_eq!(outcome.report.text(), "No mechanical effects.");

    let text = narrator.narrate("I wait", &outcome, ContentPolicy::Family).await;
    assert_eq!(text, "The candle gutters out.");

    let requests = narrator.client().transport().requests();
    assert!(requests[1].prompt.contains("No mechanical effects."));
    assert!(!requests[1].json_output);
}

#[tokio::test(start_paused = true)]
async fn test_narrate_uses_model_text() {
    let mock = MockTransport::new()
        .with_response(r#"{"attack_target_ac": 1, "attack_damage_dice": "1d6"}"#)
        .with_response("  Your blade finds its mark.  ");
    let narrator = narrator(mock);
    let mut hero = fighter();
    let mut session = SessionState::default();

    let outcome = narrator
        .take_turn("I swing", &mut hero, &mut session, ContentPolicy::Full)
        .await
        .unwrap();
    assert_eq!(outcome.report.xp_granted, 50);

    let text = narrator.narrate("I swing", &outcome, ContentPolicy::Full).await;
    assert_eq!(text, "Your blade finds its mark.");
}
