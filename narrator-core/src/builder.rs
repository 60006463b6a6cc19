//! Level 1 character creation.
//!
//! The model picks a name, race, class and a few skills; everything numeric
//! comes from here. Scores are the standard array laid out in the class's
//! priority order, and each class starts with a fixed kit and purse.

use crate::character::{
    AbilityScores, ArmorCategory, Character, CharacterClass, Item, ItemType, Skill, SpellSlots,
};
use crate::inventory;

/// Standard array values.
pub const STANDARD_ARRAY: [u8; 6] = [15, 14, 13, 12, 10, 8];

/// Skill proficiencies a new character may pick.
pub const MAX_STARTING_SKILLS: usize = 4;

/// Standard array assigned by the class's ability priority.
pub fn distribute_stats(class: CharacterClass) -> AbilityScores {
    let mut scores = AbilityScores::default();
    for (ability, value) in class.ability_priority().into_iter().zip(STANDARD_ARRAY) {
        scores.set(ability, value);
    }
    scores
}

/// Items and gold a class starts with.
#[derive(Debug, Clone, PartialEq)]
pub struct StartingKit {
    pub items: Vec<Item>,
    pub gold: i32,
}

fn leather() -> Item {
    Item::armor("Leather Armor", 11, ArmorCategory::Light).equipped()
}

fn shield() -> Item {
    Item::armor("Shield", 2, ArmorCategory::Shield).equipped()
}

fn dagger(count: i32) -> Item {
    Item::weapon("Dagger", "1d4", "piercing").with_quantity(count)
}

fn gear(name: &str) -> Item {
    Item::new(name, ItemType::Misc)
}

/// The fixed kit for a class. Worn armor comes equipped; every kit also
/// carries a healing potion and rations.
pub fn starting_kit(class: CharacterClass) -> StartingKit {
    let (mut items, gold) = match class {
        CharacterClass::Barbarian => (
            vec![
                Item::weapon("Greataxe", "1d12", "slashing"),
                Item::weapon("Handaxe", "1d6", "slashing").with_quantity(2),
                gear("Explorer's Pack"),
            ],
            10,
        ),
        CharacterClass::Bard => (
            vec![
                Item::weapon("Rapier", "1d8", "piercing"),
                dagger(1),
                leather(),
                gear("Lute"),
            ],
            15,
        ),
        CharacterClass::Cleric => (
            vec![
                Item::weapon("Mace", "1d6", "bludgeoning"),
                Item::armor("Scale Mail", 14, ArmorCategory::Medium).equipped(),
                shield(),
                gear("Holy Symbol"),
            ],
            15,
        ),
        CharacterClass::Druid => (
            vec![
                Item::weapon("Quarterstaff", "1d6", "bludgeoning"),
                leather(),
                gear("Druidic Focus"),
            ],
            10,
        ),
        CharacterClass::Fighter => (
            vec![
                Item::weapon("Longsword", "1d8", "slashing"),
                Item::weapon("Light Crossbow", "1d8", "piercing"),
                Item::new("Bolts", ItemType::Ammo).with_quantity(20),
                Item::armor("Chain Mail", 16, ArmorCategory::Heavy).equipped(),
                shield(),
            ],
            15,
        ),
        CharacterClass::Monk => (
            vec![
                Item::weapon("Shortsword", "1d6", "piercing"),
                Item::weapon("Darts", "1d4", "piercing").with_quantity(10),
                gear("Explorer's Pack"),
            ],
            5,
        ),
        CharacterClass::Paladin => (
            vec![
                Item::weapon("Longsword", "1d8", "slashing"),
                Item::armor("Chain Mail", 16, ArmorCategory::Heavy).equipped(),
                shield(),
                gear("Holy Symbol"),
            ],
            15,
        ),
        CharacterClass::Ranger => (
            vec![
                Item::weapon("Longbow", "1d8", "piercing"),
                Item::new("Arrows", ItemType::Ammo).with_quantity(20),
                Item::weapon("Shortsword", "1d6", "piercing").with_quantity(2),
                leather(),
            ],
            15,
        ),
        CharacterClass::Rogue => (
            vec![
                Item::weapon("Rapier", "1d8", "piercing"),
                Item::weapon("Shortbow", "1d6", "piercing"),
                Item::new("Arrows", ItemType::Ammo).with_quantity(20),
                leather(),
                gear("Thieves' Tools"),
            ],
            15,
        ),
        CharacterClass::Sorcerer => (
            vec![
                Item::weapon("Light Crossbow", "1d8", "piercing"),
                Item::new("Bolts", ItemType::Ammo).with_quantity(20),
                dagger(2),
                gear("Arcane Focus"),
            ],
            10,
        ),
        CharacterClass::Warlock => (
            vec![
                Item::weapon("Light Crossbow", "1d8", "piercing"),
                Item::new("Bolts", ItemType::Ammo).with_quantity(20),
                dagger(2),
                leather(),
                gear("Arcane Focus"),
            ],
            10,
        ),
        CharacterClass::Wizard => (
            vec![
                Item::weapon("Quarterstaff", "1d6", "bludgeoning"),
                gear("Spellbook"),
                gear("Arcane Focus"),
            ],
            10,
        ),
    };
    items.push(Item::new("Healing Potion", ItemType::Consumable));
    items.push(gear("Rations").with_quantity(5));
    StartingKit { items, gold }
}

/// Level 1 spell slots: two for full casters, one pact slot for warlocks.
pub fn starting_spell_slots(class: CharacterClass) -> SpellSlots {
    match class {
        CharacterClass::Warlock => SpellSlots::new().with_tier(1, 1),
        CharacterClass::Bard
        | CharacterClass::Cleric
        | CharacterClass::Druid
        | CharacterClass::Sorcerer
        | CharacterClass::Wizard => SpellSlots::new().with_tier(1, 2),
        _ => SpellSlots::new(),
    }
}

/// Builds a playable level 1 character from loose, model-supplied names.
///
/// Nothing here fails: an unknown class becomes Fighter, unknown skills are
/// dropped and an empty name becomes "Unnamed".
#[derive(Debug, Clone, Default)]
pub struct CharacterBuilder {
    name: String,
    class: String,
    race: String,
    skills: Vec<String>,
    backstory: String,
}

impl CharacterBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// English or Russian class name.
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn race(mut self, race: impl Into<String>) -> Self {
        self.race = race.into();
        self
    }

    /// Skill names in preference order; only the first
    /// [`MAX_STARTING_SKILLS`] recognised ones are kept.
    pub fn skills<S: AsRef<str>>(mut self, skills: impl IntoIterator<Item = S>) -> Self {
        self.skills = skills.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn backstory(mut self, backstory: impl Into<String>) -> Self {
        self.backstory = backstory.into();
        self
    }

    pub fn build(self) -> Character {
        let class = CharacterClass::normalize(&self.class);

        let mut skills: Vec<Skill> = Vec::new();
        for name in &self.skills {
            if skills.len() == MAX_STARTING_SKILLS {
                tracing::debug!(skill = %name, "Skill limit reached, dropping");
                continue;
            }
            match Skill::parse(name) {
                Some(skill) if !skills.contains(&skill) => skills.push(skill),
                Some(_) => {}
                None => tracing::debug!(skill = %name, "Unknown skill, dropping"),
            }
        }

        let name = match self.name.trim() {
            "" => "Unnamed",
            name => name,
        };
        let kit = starting_kit(class);
        let mut character = Character::new(name, class, distribute_stats(class))
            .with_skills(skills)
            .with_gold(kit.gold)
            .with_spell_slots(starting_spell_slots(class))
            .with_backstory(self.backstory.trim());
        if !self.race.trim().is_empty() {
            character = character.with_race(self.race.trim());
        }

        tracing::info!(name = %character.name, class = %class, "Built level 1 character");
        character.with_inventory(inventory::ensure_ammo(kit.items))
    }
}
