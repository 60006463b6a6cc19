//! Deterministic rules core for an AI-narrated D&D 5e session.
//!
//! The model proposes, the rules decide. Each turn the model is asked for a
//! structured [`MechanicsDecision`]; the ingestion pipeline repairs and
//! validates whatever text comes back, and the turn orchestrator executes
//! the decision against the [`Character`] with real dice.
//!
//! This crate provides:
//! - Dice rolling from a cryptographically secure source
//! - 5e character mechanics: checks, attacks, damage, leveling, rests
//! - Level 1 character creation with class stats, kits and purses
//! - `#[derive(Schema)]` record contracts and a forgiving JSON ingestion pipeline
//! - A generation client with retries, model fallback and typed errors
//!
//! # Quick Start
//!
//! ```ignore
//! use narrator_core::{
//!     Character, CharacterClass, AbilityScores, ContentPolicy, GenerationClient,
//!     GenerationConfig, Narrator, SessionState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gemini = gemini::Gemini::from_env()?;
//!     let narrator = Narrator::new(GenerationClient::new(gemini, GenerationConfig::from_env()));
//!
//!     let mut hero = Character::new("Thorin", CharacterClass::Fighter, AbilityScores::standard_array());
//!     let mut session = SessionState::new("The Prancing Pony", "Find the missing caravan");
//!
//!     let outcome = narrator
//!         .take_turn("I kick open the cellar door", &mut hero, &mut session, ContentPolicy::Full)
//!         .await?;
//!     println!("{}", outcome.report.text());
//!     Ok(())
//! }
//! ```

extern crate self as narrator_core;

pub mod builder;
pub mod character;
pub mod decision;
pub mod dice;
pub mod generation;
pub mod ingest;
pub mod inventory;
pub mod rules;
pub mod schema;
pub mod testing;
pub mod turn;

// Re-export for convenience
pub use narrator_macros::Schema;
pub use schema::Schema;

// Primary public API
pub use builder::{distribute_stats, starting_kit, CharacterBuilder, StartingKit};
pub use character::{Ability, AbilityScores, Character, CharacterClass, Item, ItemType, Skill};
pub use decision::{CharacterProposal, MechanicsDecision, MissionProposal, PersonalizationAnalysis};
pub use dice::{Advantage, DiceExpression, RollResult};
pub use generation::{
    ContentPolicy, FailureClass, GenerationClient, GenerationConfig, GenerationError, ModelTier,
    ProviderError, Transport,
};
pub use ingest::{ingest, IngestError};
pub use rules::RulesError;
pub use testing::MockTransport;
pub use turn::{resolve_turn, MechanicsReport, Narrator, SessionState, TurnOutcome};
