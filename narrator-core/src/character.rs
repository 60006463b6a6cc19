//! Character model.
//!
//! The mutable aggregate the turn orchestrator changes through the functions
//! in [`crate::rules`] and [`crate::inventory`]. Nothing else writes to a
//! character's fields during play.

use crate::dice::DieType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::rules::{self, RulesError};

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }

    /// Full name, abbreviation, or Russian name, in any case.
    pub fn parse(name: &str) -> Option<Ability> {
        let key = name.trim().to_lowercase();
        let ability = match key.as_str() {
            "strength" | "str" | "сила" => Ability::Strength,
            "dexterity" | "dex" | "ловкость" => Ability::Dexterity,
            "constitution" | "con" | "телосложение" => Ability::Constitution,
            "intelligence" | "int" | "интеллект" => Ability::Intelligence,
            "wisdom" | "wis" | "мудрость" => Ability::Wisdom,
            "charisma" | "cha" | "харизма" => Ability::Charisma,
            _ => return None,
        };
        Some(ability)
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Ability {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ability::parse(s).ok_or_else(|| RulesError::UnknownAbility(s.to_string()))
    }
}

pub const MIN_SCORE: u8 = 3;
pub const MAX_SCORE: u8 = 20;

/// Ability scores container. Scores stay within 3–20.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        let mut scores = Self::default();
        for (ability, value) in Ability::all().into_iter().zip([str, dex, con, int, wis, cha]) {
            scores.set(ability, value);
        }
        scores
    }

    pub fn standard_array() -> Self {
        Self::new(15, 14, 13, 12, 10, 8)
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    /// Set a score, clamped to 3–20.
    pub fn set(&mut self, ability: Ability, value: u8) {
        let value = value.clamp(MIN_SCORE, MAX_SCORE);
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        rules::ability_modifier(self.get(ability))
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        }
    }
}

// ============================================================================
// Skills
// ============================================================================

/// The 18 skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Skill {
    Acrobatics,
    AnimalHandling,
    Arcana,
    Athletics,
    Deception,
    History,
    Insight,
    Intimidation,
    Investigation,
    Medicine,
    Nature,
    Perception,
    Performance,
    Persuasion,
    Religion,
    SleightOfHand,
    Stealth,
    Survival,
}

impl Skill {
    pub fn ability(&self) -> Ability {
        match self {
            Skill::Athletics => Ability::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Ability::Dexterity,
            Skill::Arcana
            | Skill::History
            | Skill::Investigation
            | Skill::Nature
            | Skill::Religion => Ability::Intelligence,
            Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Ability::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Ability::Charisma
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Skill::Acrobatics => "Acrobatics",
            Skill::AnimalHandling => "Animal Handling",
            Skill::Arcana => "Arcana",
            Skill::Athletics => "Athletics",
            Skill::Deception => "Deception",
            Skill::History => "History",
            Skill::Insight => "Insight",
            Skill::Intimidation => "Intimidation",
            Skill::Investigation => "Investigation",
            Skill::Medicine => "Medicine",
            Skill::Nature => "Nature",
            Skill::Perception => "Perception",
            Skill::Performance => "Performance",
            Skill::Persuasion => "Persuasion",
            Skill::Religion => "Religion",
            Skill::SleightOfHand => "Sleight of Hand",
            Skill::Stealth => "Stealth",
            Skill::Survival => "Survival",
        }
    }

    pub fn all() -> [Skill; 18] {
        [
            Skill::Acrobatics,
            Skill::AnimalHandling,
            Skill::Arcana,
            Skill::Athletics,
            Skill::Deception,
            Skill::History,
            Skill::Insight,
            Skill::Intimidation,
            Skill::Investigation,
            Skill::Medicine,
            Skill::Nature,
            Skill::Perception,
            Skill::Performance,
            Skill::Persuasion,
            Skill::Religion,
            Skill::SleightOfHand,
            Skill::Stealth,
            Skill::Survival,
        ]
    }

    /// Case-insensitive English name (spaces, underscores and hyphens
    /// optional) or one of the Russian names players see.
    pub fn parse(name: &str) -> Option<Skill> {
        let key: String = name
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect();

        if let Some(skill) = Skill::all()
            .into_iter()
            .find(|s| s.name().to_lowercase().replace(' ', "") == key)
        {
            return Some(skill);
        }

        let skill = match key.as_str() {
            "акробатика" => Skill::Acrobatics,
            "уходзаживотными" => Skill::AnimalHandling,
            "магия" => Skill::Arcana,
            "атлетика" => Skill::Athletics,
            "обман" => Skill::Deception,
            "история" => Skill::History,
            "проницательность" => Skill::Insight,
            "запугивание" => Skill::Intimidation,
            "анализ" | "расследование" => Skill::Investigation,
            "медицина" => Skill::Medicine,
            "природа" => Skill::Nature,
            "внимательность" | "восприятие" => Skill::Perception,
            "выступление" => Skill::Performance,
            "убеждение" => Skill::Persuasion,
            "религия" => Skill::Religion,
            "ловкостьрук" => Skill::SleightOfHand,
            "скрытность" => Skill::Stealth,
            "выживание" => Skill::Survival,
            _ => return None,
        };
        Some(skill)
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Skill {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Skill::parse(s).ok_or_else(|| RulesError::UnknownSkill(s.to_string()))
    }
}

// ============================================================================
// Classes
// ============================================================================

/// The 12 character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl CharacterClass {
    pub fn hit_die(&self) -> DieType {
        match self {
            CharacterClass::Barbarian => DieType::D12,
            CharacterClass::Fighter | CharacterClass::Paladin | CharacterClass::Ranger => {
                DieType::D10
            }
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Monk
            | CharacterClass::Rogue
            | CharacterClass::Warlock => DieType::D8,
            CharacterClass::Sorcerer | CharacterClass::Wizard => DieType::D6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
        }
    }

    pub fn all() -> [CharacterClass; 12] {
        [
            CharacterClass::Barbarian,
            CharacterClass::Bard,
            CharacterClass::Cleric,
            CharacterClass::Druid,
            CharacterClass::Fighter,
            CharacterClass::Monk,
            CharacterClass::Paladin,
            CharacterClass::Ranger,
            CharacterClass::Rogue,
            CharacterClass::Sorcerer,
            CharacterClass::Warlock,
            CharacterClass::Wizard,
        ]
    }

    /// Saving throw proficiencies granted at level 1.
    pub fn saving_throws(&self) -> [Ability; 2] {
        use Ability::*;
        match self {
            CharacterClass::Barbarian | CharacterClass::Fighter => [Strength, Constitution],
            CharacterClass::Bard => [Dexterity, Charisma],
            CharacterClass::Cleric | CharacterClass::Paladin | CharacterClass::Warlock => {
                [Wisdom, Charisma]
            }
            CharacterClass::Druid | CharacterClass::Wizard => [Intelligence, Wisdom],
            CharacterClass::Monk | CharacterClass::Ranger => [Strength, Dexterity],
            CharacterClass::Rogue => [Dexterity, Intelligence],
            CharacterClass::Sorcerer => [Constitution, Charisma],
        }
    }

    /// English or Russian class name in any case; unknown names give `None`.
    pub fn parse(name: &str) -> Option<CharacterClass> {
        let key = name.trim().to_lowercase();
        if let Some(class) = CharacterClass::all()
            .into_iter()
            .find(|c| c.name().to_lowercase() == key)
        {
            return Some(class);
        }
        let class = match key.as_str() {
            "варвар" => CharacterClass::Barbarian,
            "бард" => CharacterClass::Bard,
            "жрец" | "клирик" => CharacterClass::Cleric,
            "друид" => CharacterClass::Druid,
            "воин" | "боец" => CharacterClass::Fighter,
            "монах" => CharacterClass::Monk,
            "паладин" => CharacterClass::Paladin,
            "следопыт" | "рейнджер" => CharacterClass::Ranger,
            "плут" | "разбойник" => CharacterClass::Rogue,
            "чародей" => CharacterClass::Sorcerer,
            "колдун" | "чернокнижник" => CharacterClass::Warlock,
            "волшебник" | "маг" => CharacterClass::Wizard,
            _ => return None,
        };
        Some(class)
    }

    /// Like [`CharacterClass::parse`], but unknown names become Fighter.
    pub fn normalize(name: &str) -> CharacterClass {
        CharacterClass::parse(name).unwrap_or_else(|| {
            tracing::warn!(class = name, "Unknown class name, using Fighter");
            CharacterClass::Fighter
        })
    }

    /// Abilities from most to least important for the class.
    pub fn ability_priority(&self) -> [Ability; 6] {
        use Ability::*;
        match self {
            CharacterClass::Barbarian => [Strength, Constitution, Dexterity, Wisdom, Charisma, Intelligence],
            CharacterClass::Bard => [Charisma, Dexterity, Constitution, Wisdom, Intelligence, Strength],
            CharacterClass::Cleric => [Wisdom, Constitution, Strength, Dexterity, Charisma, Intelligence],
            CharacterClass::Druid => [Wisdom, Constitution, Dexterity, Intelligence, Charisma, Strength],
            CharacterClass::Fighter => [Strength, Constitution, Dexterity, Wisdom, Charisma, Intelligence],
            CharacterClass::Monk => [Dexterity, Wisdom, Constitution, Strength, Intelligence, Charisma],
            CharacterClass::Paladin => [Strength, Charisma, Constitution, Wisdom, Dexterity, Intelligence],
            CharacterClass::Ranger => [Dexterity, Wisdom, Constitution, Strength, Intelligence, Charisma],
            CharacterClass::Rogue => [Dexterity, Constitution, Intelligence, Charisma, Wisdom, Strength],
            CharacterClass::Sorcerer => [Charisma, Constitution, Dexterity, Wisdom, Intelligence, Strength],
            CharacterClass::Warlock => [Charisma, Constitution, Dexterity, Wisdom, Intelligence, Strength],
            CharacterClass::Wizard => [Intelligence, Constitution, Dexterity, Wisdom, Charisma, Strength],
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Hit dice pool spent on short rests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitDice {
    pub current: u8,
    pub max: u8,
    pub die: DieType,
}

impl HitDice {
    pub fn new(die: DieType, count: u8) -> Self {
        Self {
            current: count,
            max: count,
            die,
        }
    }

    /// Spend one die if any remain.
    pub fn spend(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        true
    }

    /// Recover `max(1, max / 2)` dice, capped at the pool size. Returns the
    /// number actually recovered.
    pub fn recover_half(&mut self) -> u8 {
        let before = self.current;
        let amount = (self.max / 2).max(1);
        self.current = (self.current + amount).min(self.max);
        self.current - before
    }
}

/// Spell slot tracking, keyed by slot level.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpellSlots {
    pub slots: BTreeMap<u8, SlotInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotInfo {
    pub current: u8,
    pub max: u8,
}

impl SpellSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(mut self, level: u8, max: u8) -> Self {
        self.slots.insert(level, SlotInfo { current: max, max });
        self
    }

    pub fn use_slot(&mut self, level: u8) -> bool {
        match self.slots.get_mut(&level) {
            Some(slot) if slot.current > 0 => {
                slot.current -= 1;
                true
            }
            _ => false,
        }
    }

    /// Refill every tier. Returns how many slots came back.
    pub fn recover_all(&mut self) -> u32 {
        self.slots
            .values_mut()
            .map(|slot| {
                let missing = slot.max.saturating_sub(slot.current);
                slot.current = slot.max;
                missing as u32
            })
            .sum()
    }
}

/// Death saving throw counters, 0–3 each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
}

impl DeathSaves {
    pub fn add_success(&mut self) {
        self.successes = (self.successes + 1).min(3);
    }

    pub fn add_failures(&mut self, count: u8) {
        self.failures = (self.failures + count).min(3);
    }

    pub fn reset(&mut self) {
        self.successes = 0;
        self.failures = 0;
    }

    pub fn is_clear(&self) -> bool {
        self.successes == 0 && self.failures == 0
    }
}

// ============================================================================
// Items
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Weapon,
    Armor,
    Ammo,
    Consumable,
    #[default]
    Misc,
}

impl ItemType {
    /// Loose type name; anything unrecognised is `Misc`.
    pub fn parse(name: &str) -> ItemType {
        match name.trim().to_lowercase().as_str() {
            "weapon" => ItemType::Weapon,
            "armor" | "armour" | "shield" => ItemType::Armor,
            "ammo" | "ammunition" => ItemType::Ammo,
            "consumable" | "potion" => ItemType::Consumable,
            _ => ItemType::Misc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmorCategory {
    Light,
    Medium,
    Heavy,
    Shield,
}

/// Mechanical data attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemMechanics {
    Weapon { damage: String, damage_type: String },
    Armor { ac: i32, category: ArmorCategory },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub item_type: ItemType,
    pub quantity: i32,
    #[serde(default)]
    pub equipped: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mechanics: Option<ItemMechanics>,
}

impl Item {
    pub fn new(name: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            name: name.into(),
            item_type,
            quantity: 1,
            equipped: false,
            description: String::new(),
            mechanics: None,
        }
    }

    pub fn weapon(name: impl Into<String>, damage: impl Into<String>, damage_type: impl Into<String>) -> Self {
        let mut item = Self::new(name, ItemType::Weapon);
        item.mechanics = Some(ItemMechanics::Weapon {
            damage: damage.into(),
            damage_type: damage_type.into(),
        });
        item
    }

    pub fn armor(name: impl Into<String>, ac: i32, category: ArmorCategory) -> Self {
        let mut item = Self::new(name, ItemType::Armor);
        item.mechanics = Some(ItemMechanics::Armor { ac, category });
        item
    }

    pub fn with_quantity(mut self, quantity: i32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn equipped(mut self) -> Self {
        self.equipped = true;
        self
    }

    /// Armor class data, for armor-typed items that carry it.
    pub fn armor_stats(&self) -> Option<(i32, ArmorCategory)> {
        match (&self.item_type, &self.mechanics) {
            (ItemType::Armor, Some(ItemMechanics::Armor { ac, category })) => Some((*ac, *category)),
            _ => None,
        }
    }

    pub fn is_shield(&self) -> bool {
        matches!(self.armor_stats(), Some((_, ArmorCategory::Shield)))
    }

    /// Case-insensitive name match.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

// ============================================================================
// Character
// ============================================================================

pub const MAX_LEVEL: u8 = 20;

/// A player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub race: String,
    pub class: CharacterClass,
    pub level: u8,
    pub experience: u32,
    pub ability_scores: AbilityScores,
    pub current_hp: i32,
    pub max_hp: i32,
    pub armor_class: i32,
    pub proficiency_bonus: i32,
    pub speed: u32,
    pub gold: i32,
    pub skill_proficiencies: BTreeSet<Skill>,
    pub save_proficiencies: BTreeSet<Ability>,
    pub inventory: Vec<Item>,
    pub hit_dice: HitDice,
    pub spell_slots: SpellSlots,
    pub conditions: Vec<String>,
    pub death_saves: DeathSaves,
    #[serde(default)]
    pub backstory: String,
}

impl Character {
    /// A fresh level 1 character at full health.
    pub fn new(name: impl Into<String>, class: CharacterClass, ability_scores: AbilityScores) -> Self {
        let hit_die = class.hit_die();
        let con_mod = ability_scores.modifier(Ability::Constitution);
        let max_hp = (hit_die.sides() as i32 + con_mod).max(1);
        let armor_class = rules::calculate_ac(ability_scores.modifier(Ability::Dexterity), &[]);

        Self {
            name: name.into(),
            race: "Human".to_string(),
            class,
            level: 1,
            experience: 0,
            ability_scores,
            current_hp: max_hp,
            max_hp,
            armor_class,
            proficiency_bonus: rules::proficiency_bonus(1),
            speed: 30,
            gold: 0,
            skill_proficiencies: BTreeSet::new(),
            save_proficiencies: class.saving_throws().into_iter().collect(),
            inventory: Vec::new(),
            hit_dice: HitDice::new(hit_die, 1),
            spell_slots: SpellSlots::new(),
            conditions: Vec::new(),
            death_saves: DeathSaves::default(),
            backstory: String::new(),
        }
    }

    pub fn with_race(mut self, race: impl Into<String>) -> Self {
        self.race = race.into();
        self
    }

    pub fn with_skills(mut self, skills: impl IntoIterator<Item = Skill>) -> Self {
        self.skill_proficiencies.extend(skills);
        self
    }

    pub fn with_gold(mut self, gold: i32) -> Self {
        self.gold = gold.max(0);
        self
    }

    pub fn with_backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    pub fn with_spell_slots(mut self, spell_slots: SpellSlots) -> Self {
        self.spell_slots = spell_slots;
        self
    }

    /// Replace the inventory and recompute armor class from it.
    pub fn with_inventory(mut self, inventory: Vec<Item>) -> Self {
        self.inventory = inventory;
        rules::refresh_ac(&mut self);
        self
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        self.ability_scores.modifier(ability)
    }

    pub fn is_proficient_in(&self, skill: Skill) -> bool {
        self.skill_proficiencies.contains(&skill)
    }

    pub fn is_proficient_save(&self, ability: Ability) -> bool {
        self.save_proficiencies.contains(&ability)
    }

    pub fn is_unconscious(&self) -> bool {
        self.current_hp <= 0
    }

    pub fn item(&self, name: &str) -> Option<&Item> {
        self.inventory.iter().find(|i| i.is_named(name))
    }
}
