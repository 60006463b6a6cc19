//! Turn orchestration.
//!
//! [`resolve_turn`] executes a validated [`MechanicsDecision`] against a
//! character in a fixed order:
//!
//! 1. skill checks
//! 2. saving throws
//! 3. the player's attack
//! 4. NPC actions
//! 5. stat deltas
//! 6. inventory changes, then the ammunition guarantee
//! 7. gold
//! 8. experience
//!
//! A step that cannot run (an unknown skill, unusable dice) is skipped with a
//! warning and the rest of the turn continues. [`Narrator`] wraps this with
//! the structured generation call, so nothing is mutated until the decision
//! has been fully ingested.

use crate::character::{Ability, Character, Skill};
use crate::decision::{MechanicsDecision, NpcAction, StatDelta};
use crate::dice::{self, Advantage, DiceExpression};
use crate::generation::{ContentPolicy, GenerationClient, GenerationError, ModelTier, Transport};
use crate::inventory;
use crate::rules::{self, HpStatus, LevelUp, RulesError, StatField};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Damage dice used when the decision asks for an attack without naming any.
const DEFAULT_ATTACK_DICE: &str = "1d8";

/// XP granted when the model awarded none but dice were rolled.
const FALLBACK_XP_ATTACK: u32 = 50;
const FALLBACK_XP_DAMAGE_TAKEN: u32 = 30;
const FALLBACK_XP_SAVE: u32 = 20;
const FALLBACK_XP_SKILL: u32 = 10;

const NO_EFFECTS: &str = "No mechanical effects.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnStep {
    SkillCheck,
    SavingThrow,
    Attack,
    NpcAction,
    StatChange,
}

impl fmt::Display for TurnStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnStep::SkillCheck => "skill check",
            TurnStep::SavingThrow => "saving throw",
            TurnStep::Attack => "attack",
            TurnStep::NpcAction => "NPC action",
            TurnStep::StatChange => "stat change",
        };
        f.write_str(name)
    }
}

/// A mechanics step that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepWarning {
    pub step: TurnStep,
    pub error: RulesError,
}

impl fmt::Display for StepWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "⚠ Skipped {}: {}", self.step, self.error)
    }
}

/// Everything that happened mechanically in one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanicsReport {
    /// Player-facing lines in execution order, warnings included.
    pub lines: Vec<String>,
    pub warnings: Vec<StepWarning>,
    pub leveled_up: bool,
    pub level_up: Option<LevelUp>,
    pub old_hp: i32,
    pub new_hp: i32,
    /// HP actually lost this turn.
    pub damage_taken: i32,
    pub death_state: HpStatus,
    /// XP granted, including any fallback amount.
    pub xp_granted: u32,
}

impl MechanicsReport {
    fn new(character: &Character) -> Self {
        Self {
            lines: Vec::new(),
            warnings: Vec::new(),
            leveled_up: false,
            level_up: None,
            old_hp: character.current_hp,
            new_hp: character.current_hp,
            damage_taken: 0,
            death_state: hp_status(character),
            xp_granted: 0,
        }
    }

    fn warn(&mut self, step: TurnStep, error: RulesError) {
        tracing::warn!(step = %step, error = %error, "Skipping mechanics step");
        let warning = StepWarning { step, error };
        self.lines.push(warning.to_string());
        self.warnings.push(warning);
    }

    /// The lines joined for the narrator, or a placeholder when empty.
    pub fn text(&self) -> String {
        if self.lines.is_empty() {
            NO_EFFECTS.to_string()
        } else {
            self.lines.join("\n")
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn hp_status(character: &Character) -> HpStatus {
    if character.current_hp > 0 {
        HpStatus::Alive
    } else {
        HpStatus::Unconscious
    }
}

fn parse_dice(notation: &str) -> Result<DiceExpression, RulesError> {
    DiceExpression::parse(notation).map_err(|e| RulesError::InvalidDice {
        notation: notation.to_string(),
        reason: e.to_string(),
    })
}

/// Apply a decision to a character, drawing dice from the OS RNG.
pub fn resolve_turn(character: &mut Character, decision: &MechanicsDecision) -> MechanicsReport {
    resolve_turn_with_rng(character, decision, &mut OsRng)
}

pub fn resolve_turn_with_rng<R: Rng + ?Sized>(
    character: &mut Character,
    decision: &MechanicsDecision,
    rng: &mut R,
) -> MechanicsReport {
    let mut report = MechanicsReport::new(character);
    let mut rolled_skill = false;
    let mut rolled_save = false;
    let mut attacked = false;

    for request in &decision.skill_checks {
        match request.skill.parse::<Skill>() {
            Ok(skill) => {
                let result =
                    rules::skill_check_with_rng(character, skill, request.dc, request.advantage(), rng);
                report.lines.push(result.to_string());
                rolled_skill = true;
            }
            Err(e) => report.warn(TurnStep::SkillCheck, e),
        }
    }

    for request in &decision.saving_throws {
        match request.ability.parse::<Ability>() {
            Ok(ability) => {
                let result =
                    rules::saving_throw_with_rng(character, ability, request.dc, request.advantage(), rng);
                report.lines.push(result.to_string());
                rolled_save = true;
            }
            Err(e) => report.warn(TurnStep::SavingThrow, e),
        }
    }

    if let Some(attack) = decision.attack() {
        let ability = if attack.ability.trim().is_empty() {
            Ok(Ability::Strength)
        } else {
            attack.ability.parse::<Ability>()
        };
        let dice = if attack.damage_dice.trim().is_empty() {
            parse_dice(DEFAULT_ATTACK_DICE)
        } else {
            parse_dice(&attack.damage_dice)
        };
        match (ability, dice) {
            (Ok(ability), Ok(dice)) => {
                let result = rules::make_attack_with_rng(
                    character,
                    attack.target_ac,
                    dice,
                    ability,
                    true,
                    attack.advantage,
                    rng,
                );
                report.lines.push(result.to_string());
                attacked = true;
            }
            (Err(e), _) | (_, Err(e)) => report.warn(TurnStep::Attack, e),
        }
    }

    for npc in &decision.npc_actions {
        if let Err(e) = resolve_npc_action(character, npc, &mut report, rng) {
            report.warn(TurnStep::NpcAction, e);
        }
    }

    for delta in &decision.stat_changes {
        if let Err(e) = resolve_stat_delta(character, delta, &mut report) {
            report.warn(TurnStep::StatChange, e);
        }
    }

    if !decision.inventory_changes.is_empty() {
        for change in decision.inventory_changes.iter().filter(|c| !c.name.trim().is_empty()) {
            let sign = if change.is_removal() { '-' } else { '+' };
            report.lines.push(format!("🎒 {sign}{}", change.name.trim()));
        }
        let items = std::mem::take(&mut character.inventory);
        character.inventory =
            inventory::ensure_ammo(inventory::merge_inventory(items, &decision.inventory_changes));
        rules::refresh_ac(character);
    }

    if decision.gold_change != 0 {
        let change = rules::apply_stat_change(character, StatField::Gold, decision.gold_change);
        report.lines.push(change.to_string());
    }

    let xp = if decision.xp_gained > 0 {
        decision.xp_gained as u32
    } else if attacked {
        FALLBACK_XP_ATTACK
    } else if (rolled_skill || rolled_save) && report.damage_taken > 0 {
        FALLBACK_XP_DAMAGE_TAKEN
    } else if rolled_save {
        FALLBACK_XP_SAVE
    } else if rolled_skill {
        FALLBACK_XP_SKILL
    } else {
        0
    };
    if xp > 0 {
        report.lines.push(format!("✨ +{xp} XP"));
        report.xp_granted = xp;
        if let Some(level_up) = rules::grant_xp_with_rng(character, xp, rng) {
            report.lines.push(level_up.to_string());
            report.leveled_up = true;
            report.level_up = Some(level_up);
        }
    }

    report.new_hp = character.current_hp;
    report.death_state = hp_status(character);
    report
}

/// Roll an NPC's damage against the character. With an attack bonus the
/// NPC must first beat the character's AC; without one the damage lands.
fn resolve_npc_action<R: Rng + ?Sized>(
    character: &mut Character,
    npc: &NpcAction,
    report: &mut MechanicsReport,
    rng: &mut R,
) -> Result<(), RulesError> {
    if npc.damage_dice.trim().is_empty() {
        return Ok(());
    }
    let mut dice = parse_dice(&npc.damage_dice)?;
    let name = if npc.name.trim().is_empty() { "Enemy" } else { npc.name.trim() };

    if let Some(bonus) = npc.attack_bonus {
        let bonus = dice::clamp_modifier(bonus);
        let attack = DiceExpression::D20.roll_with_rng(bonus, Advantage::Normal, rng);
        let hit = attack.natural_20 || (!attack.natural_1 && attack.total >= character.armor_class);
        let verdict = if attack.natural_20 {
            "💥 critical hit"
        } else if hit {
            "hit"
        } else {
            "miss"
        };
        report
            .lines
            .push(format!("🗡️ {name} attacks (AC {}): {attack} → {verdict}", character.armor_class));
        if !hit {
            return Ok(());
        }
        if attack.natural_20 {
            dice = dice.doubled();
        }
    }

    let damage = dice.roll_with_rng(0, Advantage::Normal, rng);
    let before = character.current_hp;
    let status = rules::apply_damage(character, damage.total);
    report.damage_taken = report
        .damage_taken
        .saturating_add(before - character.current_hp);
    report.lines.push(format!("{name}: {damage} → {status}"));
    Ok(())
}

fn resolve_stat_delta(
    character: &mut Character,
    delta: &StatDelta,
    report: &mut MechanicsReport,
) -> Result<(), RulesError> {
    let field = StatField::parse(&delta.stat)?;
    if delta.delta == 0 {
        return Ok(());
    }
    let change = rules::apply_stat_change(character, field, delta.delta);
    if field == StatField::CurrentHp && change.after < change.before {
        let lost = (change.before - change.after).min(i32::MAX as i64) as i32;
        report.damage_taken = report.damage_taken.saturating_add(lost);
    }
    report.lines.push(change.to_string());
    Ok(())
}

// ============================================================================
// Session
// ============================================================================

/// Campaign state a turn can move along, besides the character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub location: String,
    pub quest: String,
    pub in_combat: bool,
    pub turn_number: u32,
}

impl SessionState {
    pub fn new(location: impl Into<String>, quest: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            quest: quest.into(),
            ..Self::default()
        }
    }

    /// Apply location, quest and combat updates. Blank updates are ignored;
    /// when both combat flags are set the combat ends.
    pub fn apply_decision(&mut self, decision: &MechanicsDecision) {
        let location = decision.location_change.trim();
        if !location.is_empty() {
            self.location = location.to_string();
        }
        let quest = decision.quest_update.trim();
        if !quest.is_empty() {
            self.quest = quest.to_string();
        }
        if decision.is_combat_start {
            self.in_combat = true;
        }
        if decision.is_combat_end {
            self.in_combat = false;
        }
    }
}

// ============================================================================
// Narrator
// ============================================================================

/// The result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub decision: MechanicsDecision,
    pub report: MechanicsReport,
}

/// Runs whole turns: one structured generation, then the mechanics.
pub struct Narrator<T: Transport> {
    client: GenerationClient<T>,
    tier: ModelTier,
}

impl<T: Transport> Narrator<T> {
    pub fn new(client: GenerationClient<T>) -> Self {
        Self {
            client,
            tier: ModelTier::Default,
        }
    }

    /// Model tier used for the mechanics decision.
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn client(&self) -> &GenerationClient<T> {
        &self.client
    }

    /// Ask the model for this turn's decision and apply it.
    ///
    /// On error the character and session are untouched.
    pub async fn take_turn(
        &self,
        prompt: &str,
        character: &mut Character,
        session: &mut SessionState,
        policy: ContentPolicy,
    ) -> Result<TurnOutcome, GenerationError> {
        self.take_turn_with_rng(prompt, character, session, policy, &mut OsRng)
            .await
    }

    pub async fn take_turn_with_rng<R: Rng + ?Sized>(
        &self,
        prompt: &str,
        character: &mut Character,
        session: &mut SessionState,
        policy: ContentPolicy,
        rng: &mut R,
    ) -> Result<TurnOutcome, GenerationError> {
        let started = Instant::now();
        let decision: MechanicsDecision = self
            .client
            .generate_structured(prompt, self.tier, policy)
            .await?;

        let report = resolve_turn_with_rng(character, &decision, rng);
        session.apply_decision(&decision);
        session.turn_number = session.turn_number.saturating_add(1);

        tracing::info!(
            turn = session.turn_number,
            character = %character.name,
            hp = character.current_hp,
            lines = report.lines.len(),
            warnings = report.warnings.len(),
            leveled_up = report.leveled_up,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn resolved"
        );

        Ok(TurnOutcome { decision, report })
    }

    /// Narrate a resolved turn. Falls back to the decision's own narration
    /// context when the provider fails.
    pub async fn narrate(&self, prompt: &str, outcome: &TurnOutcome, policy: ContentPolicy) -> String {
        let prompt = format!(
            "{prompt}\n\nMECHANICS (already resolved, narrate exactly these outcomes):\n{}",
            outcome.report.text()
        );
        match self.client.generate_text(&prompt, self.tier, policy).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => fallback_narration(&outcome.decision),
            Err(e) => {
                tracing::warn!(error = %e, "Narration failed, using narration context");
                fallback_narration(&outcome.decision)
            }
        }
    }
}

fn fallback_narration(decision: &MechanicsDecision) -> String {
    let context = decision.narration_context.trim();
    if context.is_empty() {
        "...".to_string()
    } else {
        context.to_string()
    }
}
