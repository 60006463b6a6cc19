//! Structured records the model produces.
//!
//! [`MechanicsDecision`] is the per-turn intent the orchestrator executes.
//! [`CharacterProposal`] and [`MissionProposal`] drive campaign setup, and
//! [`PersonalizationAnalysis`] reads the player's tastes during onboarding.
//! All of them go through the same ingestion pipeline; unknown keys are
//! ignored and missing ones take the defaults declared here.

use crate::builder::CharacterBuilder;
use crate::character::{Ability, AbilityScores, Character, CharacterClass, Item, Skill};
use crate::dice::Advantage;
use crate::inventory;
use crate::Schema;
use serde::{Deserialize, Serialize};

const DEFAULT_DC: i32 = 10;
const DEFAULT_ATTACK_ABILITY: &str = "strength";
const DEFAULT_ACTIONS: [&str; 4] = ["Look around", "Talk", "Attack", "Use item"];

/// A skill check the player must roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct SkillCheckRequest {
    /// Skill name, e.g. "Stealth" or "Perception"
    pub skill: String,
    /// Difficulty class
    pub dc: i32,
    pub advantage: bool,
    pub disadvantage: bool,
}

impl Default for SkillCheckRequest {
    fn default() -> Self {
        Self {
            skill: String::new(),
            dc: DEFAULT_DC,
            advantage: false,
            disadvantage: false,
        }
    }
}

impl SkillCheckRequest {
    pub fn advantage(&self) -> Advantage {
        Advantage::from_flags(self.advantage, self.disadvantage)
    }
}

/// A saving throw the player must roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct SavingThrowRequest {
    /// strength/dexterity/constitution/intelligence/wisdom/charisma
    pub ability: String,
    /// Difficulty class
    pub dc: i32,
    pub advantage: bool,
    pub disadvantage: bool,
}

impl Default for SavingThrowRequest {
    fn default() -> Self {
        Self {
            ability: String::new(),
            dc: DEFAULT_DC,
            advantage: false,
            disadvantage: false,
        }
    }
}

impl SavingThrowRequest {
    pub fn advantage(&self) -> Advantage {
        Advantage::from_flags(self.advantage, self.disadvantage)
    }
}

/// Something an NPC does to the player this turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct NpcAction {
    pub name: String,
    /// What the NPC does
    pub action: String,
    /// Damage dealt to the player, e.g. "1d6+2"; empty for no damage
    pub damage_dice: String,
    /// Attack roll bonus; when null the damage always lands
    pub attack_bonus: Option<i32>,
}

/// A change to one of the player's numeric stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct StatDelta {
    /// Field name: current_hp, max_hp, gold, xp or an ability score
    pub stat: String,
    /// Change amount (negative for decrease)
    pub delta: i32,
}

/// An item gained or lost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct InventoryChange {
    /// 'add' or 'remove'
    pub action: String,
    pub name: String,
    pub quantity: i32,
    pub description: String,
    /// weapon/armor/ammo/consumable/misc
    pub item_type: String,
}

impl Default for InventoryChange {
    fn default() -> Self {
        Self {
            action: "add".to_string(),
            name: String::new(),
            quantity: 1,
            description: String::new(),
            item_type: String::new(),
        }
    }
}

impl InventoryChange {
    pub fn is_removal(&self) -> bool {
        self.action.trim().eq_ignore_ascii_case("remove")
    }
}

/// The player's attack, when the decision asks for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttackRequest {
    pub target_ac: i32,
    pub damage_dice: String,
    pub ability: String,
    pub advantage: Advantage,
}

/// The mechanical intent of one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct MechanicsDecision {
    /// One or two sentences on what happens, for the narrator
    pub narration_context: String,
    pub skill_checks: Vec<SkillCheckRequest>,
    pub saving_throws: Vec<SavingThrowRequest>,
    /// Target AC if the player attacks, 0 for no attack
    pub attack_target_ac: i32,
    /// Player weapon damage dice, e.g. "1d8"
    pub attack_damage_dice: String,
    /// Ability used for the attack: strength or dexterity
    pub attack_ability: String,
    pub attack_advantage: bool,
    pub attack_disadvantage: bool,
    pub npc_actions: Vec<NpcAction>,
    pub stat_changes: Vec<StatDelta>,
    pub inventory_changes: Vec<InventoryChange>,
    /// XP earned this turn
    pub xp_gained: i32,
    /// Gold gained (positive) or spent (negative)
    pub gold_change: i32,
    /// New location name, empty if unchanged
    pub location_change: String,
    /// New quest text, empty if unchanged
    pub quest_update: String,
    /// 3-4 short options for the player's next move
    pub available_actions: Vec<String>,
    pub is_combat_start: bool,
    pub is_combat_end: bool,
    /// Something worth remembering long term, empty if nothing
    pub important_event: String,
}

impl Default for MechanicsDecision {
    fn default() -> Self {
        Self {
            narration_context: String::new(),
            skill_checks: Vec::new(),
            saving_throws: Vec::new(),
            attack_target_ac: 0,
            attack_damage_dice: String::new(),
            attack_ability: DEFAULT_ATTACK_ABILITY.to_string(),
            attack_advantage: false,
            attack_disadvantage: false,
            npc_actions: Vec::new(),
            stat_changes: Vec::new(),
            inventory_changes: Vec::new(),
            xp_gained: 0,
            gold_change: 0,
            location_change: String::new(),
            quest_update: String::new(),
            available_actions: DEFAULT_ACTIONS.iter().map(|a| a.to_string()).collect(),
            is_combat_start: false,
            is_combat_end: false,
            important_event: String::new(),
        }
    }
}

impl MechanicsDecision {
    /// The player's attack, if the target AC is positive.
    pub fn attack(&self) -> Option<AttackRequest> {
        if self.attack_target_ac <= 0 {
            return None;
        }
        Some(AttackRequest {
            target_ac: self.attack_target_ac,
            damage_dice: self.attack_damage_dice.clone(),
            ability: self.attack_ability.clone(),
            advantage: Advantage::from_flags(self.attack_advantage, self.attack_disadvantage),
        })
    }

    /// Whether any die is rolled for the player this turn.
    pub fn has_checks(&self) -> bool {
        !self.skill_checks.is_empty() || !self.saving_throws.is_empty() || self.attack().is_some()
    }
}

/// An item in a proposed starting kit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct StartingItem {
    pub name: String,
    pub quantity: i32,
    pub weight: f32,
    pub description: String,
}

impl Default for StartingItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            quantity: 1,
            weight: 0.0,
            description: String::new(),
        }
    }
}

/// A generated player character, before it is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct CharacterProposal {
    pub name: String,
    pub race: String,
    /// One of the 12 classes, e.g. "Rogue"
    pub char_class: String,
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
    pub proficient_skills: Vec<String>,
    pub saving_throws: Vec<String>,
    pub backstory: String,
    pub starting_inventory: Vec<StartingItem>,
    pub starting_gold: i32,
    pub personality_summary: String,
}

impl Default for CharacterProposal {
    fn default() -> Self {
        Self {
            name: String::new(),
            race: String::new(),
            char_class: String::new(),
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
            proficient_skills: Vec::new(),
            saving_throws: Vec::new(),
            backstory: String::new(),
            starting_inventory: Vec::new(),
            starting_gold: 0,
            personality_summary: String::new(),
        }
    }
}

impl CharacterProposal {
    /// Build a level 1 character from the proposal's name, race, class,
    /// skills and backstory. Scores, HP, kit and gold come from the class;
    /// the proposed numbers and items are ignored.
    pub fn build_character(&self) -> Character {
        CharacterBuilder::new(&self.name)
            .class(&self.char_class)
            .race(&self.race)
            .skills(&self.proficient_skills)
            .backstory(&self.backstory)
            .build()
    }

    /// Build a level 1 character taking the proposed scores, saves, kit and
    /// gold as given. Unknown classes become Fighter and unknown skill or
    /// save names are dropped.
    pub fn to_character(&self) -> Character {
        let class = CharacterClass::parse(&self.char_class).unwrap_or_else(|| {
            tracing::warn!(class = %self.char_class, "Unknown class in proposal, using Fighter");
            CharacterClass::Fighter
        });

        let score = |v: i32| v.clamp(0, u8::MAX as i32) as u8;
        let scores = AbilityScores::new(
            score(self.strength),
            score(self.dexterity),
            score(self.constitution),
            score(self.intelligence),
            score(self.wisdom),
            score(self.charisma),
        );

        let name = if self.name.trim().is_empty() {
            "Unnamed"
        } else {
            self.name.trim()
        };
        let mut character = Character::new(name, class, scores)
            .with_skills(self.proficient_skills.iter().filter_map(|s| Skill::parse(s)))
            .with_gold(self.starting_gold);
        if !self.race.trim().is_empty() {
            character = character.with_race(self.race.trim());
        }

        let saves: Vec<Ability> = self
            .saving_throws
            .iter()
            .filter_map(|s| Ability::parse(s))
            .collect();
        if !saves.is_empty() {
            character.save_proficiencies = saves.into_iter().collect();
        }

        let kit: Vec<InventoryChange> = self
            .starting_inventory
            .iter()
            .map(|item| InventoryChange {
                name: item.name.clone(),
                quantity: item.quantity,
                description: item.description.clone(),
                ..Default::default()
            })
            .collect();
        let items: Vec<Item> = inventory::ensure_ammo(inventory::merge_inventory(Vec::new(), &kit));
        character.with_backstory(self.backstory.trim()).with_inventory(items)
    }
}

/// The opening of a campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct MissionProposal {
    pub quest_title: String,
    pub quest_description: String,
    /// First scene the player sees
    pub opening_scene: String,
    pub starting_location: String,
    /// An unanswered question that pulls the player in
    pub hook_mystery: String,
    pub first_npc_name: String,
    pub first_npc_role: String,
    pub first_npc_personality: String,
}

/// Share of a fresh reading when it is blended into a stored profile.
pub const PREFERENCE_BLEND: f32 = 0.7;

/// The player's tastes as read from their answers or recent actions.
/// Every weight is in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Schema)]
#[serde(default)]
pub struct PersonalizationAnalysis {
    /// 0-1, appetite for fights
    pub combat_pref: f32,
    /// 0-1, appetite for riddles and traps
    pub puzzle_pref: f32,
    /// 0-1, appetite for talking to NPCs
    pub dialogue_pref: f32,
    /// 0-1, appetite for wandering and discovery
    pub exploration_pref: f32,
    /// 0-1, how much romance is welcome
    pub romance_tolerance: f32,
    /// 0-1, how graphic violence may be
    pub gore_tolerance: f32,
    pub humor_pref: f32,
    /// 0-1, how invested the player seems
    pub engagement_level: f32,
    /// One or two sentences explaining the scores
    pub reasoning: String,
}

impl Default for PersonalizationAnalysis {
    fn default() -> Self {
        Self {
            combat_pref: 0.5,
            puzzle_pref: 0.5,
            dialogue_pref: 0.5,
            exploration_pref: 0.5,
            romance_tolerance: 0.3,
            gore_tolerance: 0.3,
            humor_pref: 0.5,
            engagement_level: 0.5,
            reasoning: String::new(),
        }
    }
}

impl PersonalizationAnalysis {
    fn weights(&self) -> [f32; 8] {
        [
            self.combat_pref,
            self.puzzle_pref,
            self.dialogue_pref,
            self.exploration_pref,
            self.romance_tolerance,
            self.gore_tolerance,
            self.humor_pref,
            self.engagement_level,
        ]
    }

    fn weights_mut(&mut self) -> [&mut f32; 8] {
        [
            &mut self.combat_pref,
            &mut self.puzzle_pref,
            &mut self.dialogue_pref,
            &mut self.exploration_pref,
            &mut self.romance_tolerance,
            &mut self.gore_tolerance,
            &mut self.humor_pref,
            &mut self.engagement_level,
        ]
    }

    /// Every weight pulled into `0.0..=1.0`; NaN takes the default.
    pub fn clamped(mut self) -> Self {
        let defaults = Self::default().weights();
        for (weight, default) in self.weights_mut().into_iter().zip(defaults) {
            *weight = if weight.is_nan() {
                default
            } else {
                weight.clamp(0.0, 1.0)
            };
        }
        self
    }

    /// Fold a fresh reading into this profile, the fresh one weighing
    /// [`PREFERENCE_BLEND`].
    pub fn blend(&mut self, fresh: &PersonalizationAnalysis) {
        let fresh = fresh.clone().clamped();
        for (weight, new) in self.weights_mut().into_iter().zip(fresh.weights()) {
            *weight = (PREFERENCE_BLEND * new + (1.0 - PREFERENCE_BLEND) * *weight).clamp(0.0, 1.0);
        }
        if !fresh.reasoning.trim().is_empty() {
            self.reasoning = fresh.reasoning;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{self, FieldKind, Schema as _};
    use serde_json::json;

    #[test]
    fn test_unknown_keys_ignored() {
        let decision: MechanicsDecision = serde_json::from_value(json!({
            "narration_context": "The door creaks.",
            "mood": "tense",
            "xp_gained": 5
        }))
        .unwrap();
        assert_eq!(decision.narration_context, "The door creaks.");
        assert_eq!(decision.xp_gained, 5);
        assert_eq!(decision.attack_ability, "strength");
        assert_eq!(decision.available_actions.len(), 4);
    }

    #[test]
    fn test_attack_request() {
        let mut decision = MechanicsDecision::default();
        assert!(decision.attack().is_none());
        assert!(!decision.has_checks());

        decision.attack_target_ac = 13;
        decision.attack_damage_dice = "1d6".to_string();
        decision.attack_ability = "dexterity".to_string();
        decision.attack_advantage = true;
        let attack = decision.attack().unwrap();
        assert_eq!(attack.target_ac, 13);
        assert_eq!(attack.advantage, Advantage::Advantage);
        assert!(decision.has_checks());
    }

    #[test]
    fn test_decision_schema() {
        assert_eq!(MechanicsDecision::schema_name(), "MechanicsDecision");
        let fields = MechanicsDecision::fields();
        assert_eq!(fields.len(), 19);
        let checks = fields.iter().find(|f| f.name == "skill_checks").unwrap();
        let FieldKind::RecordList(sub) = checks.kind else {
            panic!("skill_checks should be a record list");
        };
        let dc = sub().into_iter().find(|f| f.name == "dc").unwrap();
        assert_eq!(dc.default, json!(10));
        assert_eq!(dc.hint, "Difficulty class");

        let npc = NpcAction::fields();
        let bonus = npc.iter().find(|f| f.name == "attack_bonus").unwrap();
        assert!(bonus.nullable);
    }

    #[test]
    fn test_example_is_valid_decision() {
        let ex = schema::example::<MechanicsDecision>();
        let decision: MechanicsDecision = serde_json::from_value(ex).unwrap();
        assert_eq!(decision, MechanicsDecision::default());
    }

    #[test]
    fn test_character_proposal() {
        let proposal = CharacterProposal {
            name: "Vesna".to_string(),
            race: "Half-Elf".to_string(),
            char_class: "Следопыт".to_string(),
            dexterity: 16,
            constitution: 14,
            proficient_skills: vec!["Stealth".to_string(), "Lockpicking".to_string()],
            saving_throws: vec!["dexterity".to_string()],
            starting_inventory: vec![StartingItem {
                name: "Longbow".to_string(),
                ..Default::default()
            }],
            starting_gold: 15,
            ..Default::default()
        };
        let c = proposal.to_character();
        assert_eq!(c.class, CharacterClass::Ranger);
        assert_eq!(c.race, "Half-Elf");
        assert_eq!(c.max_hp, 12);
        assert_eq!(c.skill_proficiencies.len(), 1);
        assert!(c.is_proficient_save(Ability::Dexterity));
        assert!(!c.is_proficient_save(Ability::Strength));
        assert_eq!(c.gold, 15);
        assert!(c.item("Arrows").is_some());
    }

    #[test]
    fn test_unknown_class_falls_back() {
        let proposal = CharacterProposal {
            char_class: "Gunslinger".to_string(),
            ..Default::default()
        };
        let c = proposal.to_character();
        assert_eq!(c.class, CharacterClass::Fighter);
        assert_eq!(c.name, "Unnamed");
    }

    #[test]
    fn test_proposal_build_character_uses_class_numbers() {
        let proposal = CharacterProposal {
            name: "Vesna".to_string(),
            race: "Half-Elf".to_string(),
            char_class: "Следопыт".to_string(),
            strength: 30,
            dexterity: 3,
            proficient_skills: vec!["Stealth".to_string(), "Survival".to_string()],
            starting_inventory: vec![StartingItem {
                name: "Vorpal Sword".to_string(),
                ..Default::default()
            }],
            starting_gold: 9999,
            backstory: "Grew up on the border.".to_string(),
            ..Default::default()
        };
        let c = proposal.build_character();
        assert_eq!(c.class, CharacterClass::Ranger);
        assert_eq!(c.race, "Half-Elf");
        assert_eq!(c.ability_scores.dexterity, 15);
        assert_eq!(c.ability_scores.strength, 12);
        assert_eq!(c.gold, 15);
        assert!(c.item("Vorpal Sword").is_none());
        assert_eq!(c.item("Arrows").unwrap().quantity, 20);
        assert!(c.is_proficient_in(Skill::Survival));
        assert_eq!(c.backstory, "Grew up on the border.");
    }

    #[test]
    fn test_personalization_defaults_and_clamp() {
        let fields = PersonalizationAnalysis::fields();
        assert_eq!(fields.len(), 9);
        let gore = fields.iter().find(|f| f.name == "gore_tolerance").unwrap();
        assert!(matches!(gore.kind, FieldKind::Float));
        assert_eq!(gore.default, json!(0.3f32));

        let analysis: PersonalizationAnalysis = crate::ingest(
            r#"{"combat_pref": "0.9", "gore_tolerance": 1.7, "humor_pref": -2, "reasoning": "Wants fights"}"#,
        )
        .unwrap();
        let analysis = analysis.clamped();
        assert_eq!(analysis.combat_pref, 0.9);
        assert_eq!(analysis.gore_tolerance, 1.0);
        assert_eq!(analysis.humor_pref, 0.0);
        assert_eq!(analysis.puzzle_pref, 0.5);
        assert_eq!(analysis.romance_tolerance, 0.3);
        assert_eq!(analysis.reasoning, "Wants fights");

        let mut odd = PersonalizationAnalysis::default();
        odd.dialogue_pref = f32::NAN;
        assert_eq!(odd.clamped().dialogue_pref, 0.5);
    }

    #[test]
    fn test_personalization_blend() {
        let mut profile = PersonalizationAnalysis {
            reasoning: "Quiet so far".to_string(),
            ..Default::default()
        };
        profile.blend(&PersonalizationAnalysis {
            combat_pref: 1.0,
            puzzle_pref: 5.0,
            reasoning: String::new(),
            ..Default::default()
        });
        assert!((profile.combat_pref - 0.85).abs() < 1e-6);
        assert!((profile.puzzle_pref - 0.85).abs() < 1e-6);
        assert!((profile.gore_tolerance - 0.3).abs() < 1e-6);
        assert_eq!(profile.reasoning, "Quiet so far");
    }
}
