//! Inventory changes requested by a turn decision.

use crate::character::{Character, Item, ItemType};
use crate::decision::InventoryChange;
use crate::rules::{self, RulesError};

/// Ranged weapon words and the ammunition each one uses. A name matches when
/// one of its words equals an entry, so "Light Crossbow" matches and
/// "Rainbow Scarf" does not.
const RANGED_WEAPONS: &[(&str, &str)] = &[
    ("crossbow", "Bolts"),
    ("арбалет", "Bolts"),
    ("blowgun", "Blowgun Needles"),
    ("sling", "Sling Bullets"),
    ("праща", "Sling Bullets"),
    ("bow", "Arrows"),
    ("shortbow", "Arrows"),
    ("longbow", "Arrows"),
    ("лук", "Arrows"),
];

const AMMO_WORDS: &[&str] = &[
    "arrow", "bolt", "bullet", "needle", "dart", "стрел", "болт", "снаряд",
];

const DEFAULT_AMMO_QUANTITY: i32 = 20;

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn ranged_ammo(name: &str) -> Option<&'static str> {
    let name = key(name);
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .find_map(|word| {
            RANGED_WEAPONS
                .iter()
                .find(|(weapon, _)| *weapon == word)
                .map(|(_, ammo)| *ammo)
        })
}

/// Guess the type of an item the model named without saying what it is.
fn infer_type(change: &InventoryChange) -> ItemType {
    if !change.item_type.trim().is_empty() {
        return ItemType::parse(&change.item_type);
    }
    if ranged_ammo(&change.name).is_some() {
        return ItemType::Weapon;
    }
    let name = key(&change.name);
    if AMMO_WORDS.iter().any(|w| name.contains(w)) {
        ItemType::Ammo
    } else {
        ItemType::Misc
    }
}

/// Merge a batch of changes into an inventory.
///
/// Items are keyed by case-insensitive name. `remove` drops the entry
/// whatever quantity was asked for; any other action stacks onto an existing
/// entry or appends a new one. Entries left at zero or below are pruned.
pub fn merge_inventory(mut items: Vec<Item>, changes: &[InventoryChange]) -> Vec<Item> {
    for change in changes {
        let name = change.name.trim();
        if name.is_empty() {
            tracing::debug!(action = %change.action, "Skipping inventory change without a name");
            continue;
        }

        if change.is_removal() {
            items.retain(|item| !item.is_named(name));
            continue;
        }

        match items.iter_mut().find(|item| item.is_named(name)) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(change.quantity);
                if existing.description.is_empty() && !change.description.is_empty() {
                    existing.description = change.description.clone();
                }
            }
            None => items.push(
                Item::new(name, infer_type(change))
                    .with_quantity(change.quantity)
                    .with_description(change.description.clone()),
            ),
        }
    }

    items.retain(|item| item.quantity > 0);
    items
}

/// The ammunition a ranged weapon needs, if the item is one.
pub fn ammo_for(item: &Item) -> Option<&'static str> {
    if item.item_type != ItemType::Weapon {
        return None;
    }
    ranged_ammo(&item.name)
}

/// Add a default ammunition stack when a ranged weapon is carried but no
/// ammo-typed item is.
pub fn ensure_ammo(mut items: Vec<Item>) -> Vec<Item> {
    if items.iter().any(|i| i.item_type == ItemType::Ammo) {
        return items;
    }
    if let Some(ammo) = items.iter().find_map(ammo_for) {
        tracing::debug!(ammo, "Adding ammunition for ranged weapon");
        items.push(Item::new(ammo, ItemType::Ammo).with_quantity(DEFAULT_AMMO_QUANTITY));
    }
    items
}

/// Equip an item by name and refresh armor class.
///
/// Equipping body armor unequips any other body armor, so at most one is
/// ever worn through this path. Returns the names of items taken off.
pub fn equip(character: &mut Character, name: &str) -> Result<Vec<String>, RulesError> {
    let index = character
        .inventory
        .iter()
        .position(|i| i.is_named(name))
        .ok_or_else(|| RulesError::UnknownItem(name.to_string()))?;

    let is_body_armor =
        character.inventory[index].armor_stats().is_some() && !character.inventory[index].is_shield();

    let mut removed = Vec::new();
    if is_body_armor {
        for (i, item) in character.inventory.iter_mut().enumerate() {
            if i != index && item.equipped && item.armor_stats().is_some() && !item.is_shield() {
                item.equipped = false;
                removed.push(item.name.clone());
            }
        }
    }

    character.inventory[index].equipped = true;
    rules::refresh_ac(character);
    Ok(removed)
}

pub fn unequip(character: &mut Character, name: &str) -> Result<(), RulesError> {
    let item = character
        .inventory
        .iter_mut()
        .find(|i| i.is_named(name))
        .ok_or_else(|| RulesError::UnknownItem(name.to_string()))?;
    item.equipped = false;
    rules::refresh_ac(character);
    Ok(())
}
