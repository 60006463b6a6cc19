//! Rules engine.
//!
//! Every change to a [`Character`] during play goes through a function in
//! this module (or [`crate::inventory`]). Dice come from [`crate::dice`];
//! each rolling function has a `_with_rng` twin for deterministic tests.
//!
//! Results implement `Display` with the mechanics line shown to players.

use crate::character::{Ability, ArmorCategory, Character, Item, Skill, MAX_LEVEL};
use crate::dice::{Advantage, DiceExpression, RollResult};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Cumulative XP needed to reach each level, index 0 is level 1.
pub const XP_THRESHOLDS: [u32; 20] = [
    0, 300, 900, 2700, 6500, 14000, 23000, 34000, 48000, 64000, 85000, 100000, 120000, 140000,
    165000, 195000, 225000, 265000, 305000, 355000,
];

/// A mechanics step that cannot run against this character.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RulesError {
    #[error("unknown skill: {0}")]
    UnknownSkill(String),
    #[error("unknown ability: {0}")]
    UnknownAbility(String),
    #[error("unknown stat: {0}")]
    UnknownStat(String),
    #[error("no item named {0}")]
    UnknownItem(String),
    #[error("invalid dice '{notation}': {reason}")]
    InvalidDice { notation: String, reason: String },
}

pub fn ability_modifier(score: u8) -> i32 {
    (score as i32 - 10).div_euclid(2)
}

pub fn proficiency_bonus(level: u8) -> i32 {
    match level {
        0..=4 => 2,
        5..=8 => 3,
        9..=12 => 4,
        13..=16 => 5,
        _ => 6,
    }
}

/// XP required to reach `level`, or `None` outside 1–20.
pub fn xp_for_level(level: u8) -> Option<u32> {
    if level == 0 {
        return None;
    }
    XP_THRESHOLDS.get(level as usize - 1).copied()
}

// ============================================================================
// Armor class
// ============================================================================

/// Armor class from equipped armor.
///
/// Unarmored is `10 + dex`. Body armor replaces that base: light adds full
/// dex, medium adds dex capped at +2, heavy ignores dex. Shields stack on
/// top. With several body armors equipped the last one wins.
pub fn calculate_ac(dex_mod: i32, inventory: &[Item]) -> i32 {
    let mut base = 10 + dex_mod;
    let mut shield_bonus = 0;
    let mut body_armor: Option<&str> = None;

    for item in inventory.iter().filter(|i| i.equipped) {
        let Some((ac, category)) = item.armor_stats() else {
            continue;
        };
        match category {
            ArmorCategory::Shield => {
                shield_bonus += ac;
                continue;
            }
            ArmorCategory::Light => base = ac + dex_mod,
            ArmorCategory::Medium => base = ac + dex_mod.min(2),
            ArmorCategory::Heavy => base = ac,
        }
        if let Some(previous) = body_armor {
            tracing::warn!(
                previous,
                current = %item.name,
                "More than one body armor equipped, last one wins"
            );
        }
        body_armor = Some(item.name.as_str());
    }

    base + shield_bonus
}

/// Recompute and store the character's armor class.
pub fn refresh_ac(character: &mut Character) -> i32 {
    character.armor_class = calculate_ac(
        character.modifier(Ability::Dexterity),
        &character.inventory,
    );
    character.armor_class
}

// ============================================================================
// Attacks and checks
// ============================================================================

/// Result of a weapon attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackResult {
    pub attack_roll: RollResult,
    pub target_ac: i32,
    pub hit: bool,
    pub critical: bool,
    pub damage_roll: Option<RollResult>,
}

impl AttackResult {
    pub fn damage(&self) -> i32 {
        self.damage_roll.as_ref().map_or(0, |r| r.total.max(0))
    }
}

impl fmt::Display for AttackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🎲 Attack vs AC {}: {}", self.target_ac, self.attack_roll)?;
        if self.critical {
            write!(f, "💥 CRITICAL HIT!")?;
        } else if self.hit {
            write!(f, "✅ Hit!")?;
        } else {
            write!(f, "❌ Miss!")?;
        }
        if let Some(damage) = &self.damage_roll {
            write!(f, "\n⚔️ Damage: {damage}")?;
        }
        Ok(())
    }
}

/// Roll an attack. A natural 20 always hits and doubles the damage dice
/// count; the ability modifier is added to damage once.
pub fn make_attack(
    character: &Character,
    target_ac: i32,
    damage: DiceExpression,
    ability: Ability,
    proficient: bool,
    advantage: Advantage,
) -> AttackResult {
    make_attack_with_rng(
        character, target_ac, damage, ability, proficient, advantage, &mut OsRng,
    )
}

pub fn make_attack_with_rng<R: Rng + ?Sized>(
    character: &Character,
    target_ac: i32,
    damage: DiceExpression,
    ability: Ability,
    proficient: bool,
    advantage: Advantage,
    rng: &mut R,
) -> AttackResult {
    let ability_mod = character.modifier(ability);
    let attack_mod = ability_mod + if proficient { character.proficiency_bonus } else { 0 };

    let attack_roll = DiceExpression::D20.roll_with_rng(attack_mod, advantage, rng);
    let critical = attack_roll.natural_20;
    let hit = critical || attack_roll.total >= target_ac;

    let damage_roll = hit.then(|| {
        let dice = if critical { damage.doubled() } else { damage };
        dice.roll_with_rng(ability_mod, Advantage::Normal, rng)
    });

    AttackResult {
        attack_roll,
        target_ac,
        hit,
        critical,
        damage_roll,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckKind {
    Skill(Skill),
    Save(Ability),
}

/// Result of a skill check or saving throw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub kind: CheckKind,
    pub dc: i32,
    pub roll: RollResult,
    pub success: bool,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CheckKind::Skill(skill) => write!(f, "🎲 {skill} check")?,
            CheckKind::Save(ability) => write!(f, "🎲 {ability} save")?,
        }
        write!(f, " (DC {}): {}", self.dc, self.roll)?;
        if self.success {
            write!(f, "\n✅ Success!")
        } else {
            write!(f, "\n❌ Failure!")
        }
    }
}

fn resolve_check(kind: CheckKind, dc: i32, roll: RollResult) -> CheckResult {
    let success = roll.natural_20 || (!roll.natural_1 && roll.total >= dc);
    CheckResult {
        kind,
        dc,
        roll,
        success,
    }
}

pub fn skill_check(character: &Character, skill: Skill, dc: i32, advantage: Advantage) -> CheckResult {
    skill_check_with_rng(character, skill, dc, advantage, &mut OsRng)
}

pub fn skill_check_with_rng<R: Rng + ?Sized>(
    character: &Character,
    skill: Skill,
    dc: i32,
    advantage: Advantage,
    rng: &mut R,
) -> CheckResult {
    let mut modifier = character.modifier(skill.ability());
    if character.is_proficient_in(skill) {
        modifier += character.proficiency_bonus;
    }
    let roll = DiceExpression::D20.roll_with_rng(modifier, advantage, rng);
    resolve_check(CheckKind::Skill(skill), dc, roll)
}

pub fn saving_throw(character: &Character, ability: Ability, dc: i32, advantage: Advantage) -> CheckResult {
    saving_throw_with_rng(character, ability, dc, advantage, &mut OsRng)
}

pub fn saving_throw_with_rng<R: Rng + ?Sized>(
    character: &Character,
    ability: Ability,
    dc: i32,
    advantage: Advantage,
    rng: &mut R,
) -> CheckResult {
    let mut modifier = character.modifier(ability);
    if character.is_proficient_save(ability) {
        modifier += character.proficiency_bonus;
    }
    let roll = DiceExpression::D20.roll_with_rng(modifier, advantage, rng);
    resolve_check(CheckKind::Save(ability), dc, roll)
}

// ============================================================================
// Death saves, damage, healing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathSaveResult {
    pub roll: RollResult,
    pub success: bool,
    pub stabilized: bool,
    pub dead: bool,
}

impl fmt::Display for DeathSaveResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "🎲 Death save: {}", self.roll)?;
        if self.stabilized {
            write!(f, "\n💚 Stabilized!")
        } else if self.dead {
            write!(f, "\n💀 Dead...")
        } else if self.success {
            write!(f, " ✅")
        } else {
            write!(f, " ❌")
        }
    }
}

pub fn death_saving_throw(character: &mut Character) -> DeathSaveResult {
    death_saving_throw_with_rng(character, &mut OsRng)
}

pub fn death_saving_throw_with_rng<R: Rng + ?Sized>(
    character: &mut Character,
    rng: &mut R,
) -> DeathSaveResult {
    let roll = DiceExpression::D20.roll_with_rng(0, Advantage::Normal, rng);
    resolve_death_save(character, roll)
}

/// Apply an already rolled death save.
///
/// A natural 20 wakes the character at 1 HP. Otherwise 10+ is a success,
/// anything lower a failure (two on a natural 1). Three of either ends the
/// sequence and clears the counters.
pub fn resolve_death_save(character: &mut Character, roll: RollResult) -> DeathSaveResult {
    if roll.natural_20 {
        character.current_hp = 1;
        character.death_saves.reset();
        return DeathSaveResult {
            roll,
            success: true,
            stabilized: true,
            dead: false,
        };
    }

    let success = roll.total >= 10;
    if success {
        character.death_saves.add_success();
    } else {
        character
            .death_saves
            .add_failures(if roll.natural_1 { 2 } else { 1 });
    }

    let stabilized = character.death_saves.successes >= 3;
    let dead = !stabilized && character.death_saves.failures >= 3;
    if stabilized || dead {
        character.death_saves.reset();
    }

    DeathSaveResult {
        roll,
        success,
        stabilized,
        dead,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HpStatus {
    Alive,
    Unconscious,
}

impl fmt::Display for HpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HpStatus::Alive => write!(f, "alive"),
            HpStatus::Unconscious => write!(f, "unconscious"),
        }
    }
}

/// Subtract damage, clamping HP to `[0, max_hp]`. Negative amounts are
/// ignored.
pub fn apply_damage(character: &mut Character, amount: i32) -> HpStatus {
    let amount = amount.max(0);
    character.current_hp = character
        .current_hp
        .saturating_sub(amount)
        .clamp(0, character.max_hp);
    if character.current_hp == 0 {
        HpStatus::Unconscious
    } else {
        HpStatus::Alive
    }
}

/// Heal up to `max_hp`. Returns the HP actually restored. Any positive HP
/// clears the death save counters.
pub fn apply_healing(character: &mut Character, amount: i32) -> i32 {
    let before = character.current_hp;
    character.current_hp = character
        .current_hp
        .saturating_add(amount.max(0))
        .clamp(0, character.max_hp);
    if character.current_hp > 0 {
        character.death_saves.reset();
    }
    character.current_hp - before
}

// ============================================================================
// Experience
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelUp {
    pub new_level: u8,
    pub hp_roll: RollResult,
    pub hp_gained: i32,
    pub old_max_hp: i32,
    pub new_max_hp: i32,
    pub proficiency_bonus: i32,
}

impl fmt::Display for LevelUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "🎉 Level {}! HP {} → {} (+{}), proficiency +{}",
            self.new_level, self.old_max_hp, self.new_max_hp, self.hp_gained, self.proficiency_bonus
        )
    }
}

/// Add XP and advance at most one level.
pub fn grant_xp(character: &mut Character, xp: u32) -> Option<LevelUp> {
    grant_xp_with_rng(character, xp, &mut OsRng)
}

pub fn grant_xp_with_rng<R: Rng + ?Sized>(
    character: &mut Character,
    xp: u32,
    rng: &mut R,
) -> Option<LevelUp> {
    character.experience = character.experience.saturating_add(xp);

    if character.level >= MAX_LEVEL {
        return None;
    }
    let next_level = character.level + 1;
    let threshold = xp_for_level(next_level)?;
    if character.experience < threshold {
        return None;
    }

    character.level = next_level;
    character.proficiency_bonus = proficiency_bonus(next_level);

    let con_mod = character.modifier(Ability::Constitution);
    let hp_roll = character
        .hit_dice
        .die
        .expression()
        .roll_with_rng(con_mod, Advantage::Normal, rng);
    let hp_gained = hp_roll.total.max(1);
    let old_max_hp = character.max_hp;
    character.max_hp = character.max_hp.saturating_add(hp_gained);
    character.current_hp = character.current_hp.saturating_add(hp_gained);

    character.hit_dice.max = character.hit_dice.max.saturating_add(1);
    character.hit_dice.current = character.hit_dice.current.saturating_add(1);

    tracing::info!(
        name = %character.name,
        level = next_level,
        hp_gained,
        "Character leveled up"
    );

    Some(LevelUp {
        new_level: next_level,
        hp_roll,
        hp_gained,
        old_max_hp,
        new_max_hp: character.max_hp,
        proficiency_bonus: character.proficiency_bonus,
    })
}

// ============================================================================
// Rests
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestBlocked {
    FullHealth,
    NoHitDice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShortRest {
    Recovered { roll: RollResult, healed: i32 },
    NothingToDo(RestBlocked),
}

impl fmt::Display for ShortRest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShortRest::Recovered { roll, healed } => {
                write!(f, "☀️ Short rest: hit die {roll}, healed {healed} HP")
            }
            ShortRest::NothingToDo(RestBlocked::FullHealth) => {
                write!(f, "☀️ Short rest: already at full health")
            }
            ShortRest::NothingToDo(RestBlocked::NoHitDice) => {
                write!(f, "☀️ Short rest: no hit dice left")
            }
        }
    }
}

/// Spend one hit die to heal `roll + con` (never negative).
pub fn short_rest(character: &mut Character) -> ShortRest {
    short_rest_with_rng(character, &mut OsRng)
}

pub fn short_rest_with_rng<R: Rng + ?Sized>(character: &mut Character, rng: &mut R) -> ShortRest {
    if character.current_hp >= character.max_hp {
        return ShortRest::NothingToDo(RestBlocked::FullHealth);
    }
    if !character.hit_dice.spend() {
        return ShortRest::NothingToDo(RestBlocked::NoHitDice);
    }

    let con_mod = character.modifier(Ability::Constitution);
    let roll = character
        .hit_dice
        .die
        .expression()
        .roll_with_rng(con_mod, Advantage::Normal, rng);
    let healed = apply_healing(character, roll.total.max(0));
    ShortRest::Recovered { roll, healed }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongRest {
    pub hp_restored: i32,
    pub hit_dice_recovered: u8,
    pub spell_slots_recovered: u32,
    pub conditions_cleared: Vec<String>,
}

impl fmt::Display for LongRest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "🌙 Long rest: +{} HP, {} hit dice recovered",
            self.hp_restored, self.hit_dice_recovered
        )?;
        if self.spell_slots_recovered > 0 {
            write!(f, ", {} spell slots restored", self.spell_slots_recovered)?;
        }
        if !self.conditions_cleared.is_empty() {
            write!(f, ", cleared: {}", self.conditions_cleared.join(", "))?;
        }
        Ok(())
    }
}

pub fn long_rest(character: &mut Character) -> LongRest {
    let hp_restored = character.max_hp.saturating_sub(character.current_hp);
    character.current_hp = character.max_hp;
    let hit_dice_recovered = character.hit_dice.recover_half();
    let spell_slots_recovered = character.spell_slots.recover_all();
    let conditions_cleared = std::mem::take(&mut character.conditions);
    character.death_saves.reset();

    LongRest {
        hp_restored,
        hit_dice_recovered,
        spell_slots_recovered,
        conditions_cleared,
    }
}

// ============================================================================
// Stat deltas
// ============================================================================

/// Character fields a decision may change by a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatField {
    CurrentHp,
    MaxHp,
    Gold,
    Experience,
    Score(Ability),
}

impl StatField {
    pub fn parse(name: &str) -> Result<StatField, RulesError> {
        let key: String = name
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect();
        let field = match key.as_str() {
            "currenthp" | "hp" | "health" | "hitpoints" | "currenthitpoints" => StatField::CurrentHp,
            "maxhp" | "maxhitpoints" | "maximumhp" => StatField::MaxHp,
            "gold" | "gp" | "coins" => StatField::Gold,
            "xp" | "experience" | "exp" => StatField::Experience,
            _ => match Ability::parse(&key) {
                Some(ability) => StatField::Score(ability),
                None => return Err(RulesError::UnknownStat(name.to_string())),
            },
        };
        Ok(field)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatField::CurrentHp => "HP",
            StatField::MaxHp => "Max HP",
            StatField::Gold => "Gold",
            StatField::Experience => "XP",
            StatField::Score(ability) => ability.abbreviation(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatChange {
    pub field: StatField,
    pub before: i64,
    pub after: i64,
}

impl fmt::Display for StatChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "📊 {}: {} → {} ({:+})",
            self.field.label(),
            self.before,
            self.after,
            self.after - self.before
        )
    }
}

/// Apply a delta to one stat, keeping every invariant of [`Character`].
pub fn apply_stat_change(character: &mut Character, field: StatField, delta: i32) -> StatChange {
    let before: i64;
    let after: i64;
    match field {
        StatField::CurrentHp => {
            before = character.current_hp as i64;
            if delta < 0 {
                apply_damage(character, delta.saturating_neg());
            } else {
                apply_healing(character, delta);
            }
            after = character.current_hp as i64;
        }
        StatField::MaxHp => {
            before = character.max_hp as i64;
            character.max_hp = character.max_hp.saturating_add(delta).max(1);
            character.current_hp = character.current_hp.min(character.max_hp);
            after = character.max_hp as i64;
        }
        StatField::Gold => {
            before = character.gold as i64;
            character.gold = character.gold.saturating_add(delta).max(0);
            after = character.gold as i64;
        }
        StatField::Experience => {
            before = character.experience as i64;
            character.experience = (before + delta as i64).clamp(0, u32::MAX as i64) as u32;
            after = character.experience as i64;
        }
        StatField::Score(ability) => {
            let current = character.ability_scores.get(ability);
            before = current as i64;
            let target = (current as i32).saturating_add(delta).clamp(0, u8::MAX as i32) as u8;
            character.ability_scores.set(ability, target);
            if ability == Ability::Dexterity {
                refresh_ac(character);
            }
            after = character.ability_scores.get(ability) as i64;
        }
    }
    StatChange { field, before, after }
}
