//! D&D dice rolling system.
//!
//! Accepts the loose notation language models tend to emit: `NdM`,
//! `N d M` in any case, `dM`, a bare die size, and an optional `+k`/`-k`
//! modifier. Advantage and disadvantage apply to single d20 rolls.
//!
//! Production rolls draw from the operating system's CSPRNG so players
//! cannot predict outcomes by watching the bot.

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest number of dice accepted in one expression.
pub const MAX_DICE: u32 = 100;
/// Largest die size accepted in one expression.
pub const MAX_SIDES: u32 = 1000;
/// Flat modifiers are clamped to `±MAX_MODIFIER`.
pub const MAX_MODIFIER: i32 = 1000;

/// Error type for dice parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("Invalid dice count: {0}")]
    InvalidCount(u32),
    #[error("No dice specified")]
    NoDice,
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }

    /// Build from the pair of booleans decision records carry.
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Advantage {
        match (advantage, disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }
}

/// Standard D&D die types, used where only a real die face makes sense
/// (hit dice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }

    /// A single die of this type, as an expression.
    pub fn expression(&self) -> DiceExpression {
        DiceExpression {
            count: 1,
            sides: self.sides(),
            modifier: 0,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// A canonical `NdM+k` dice expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceExpression {
    /// What malformed notation falls back to.
    pub const FALLBACK: DiceExpression = DiceExpression {
        count: 1,
        sides: 4,
        modifier: 0,
    };

    /// A plain `1d20`.
    pub const D20: DiceExpression = DiceExpression {
        count: 1,
        sides: 20,
        modifier: 0,
    };

    /// Build a validated expression with no modifier.
    pub fn new(count: u32, sides: u32) -> Result<Self, DiceError> {
        if count == 0 || count > MAX_DICE {
            return Err(DiceError::InvalidCount(count));
        }
        if !(2..=MAX_SIDES).contains(&sides) {
            return Err(DiceError::InvalidDieSize(sides));
        }
        Ok(Self {
            count,
            sides,
            modifier: 0,
        })
    }

    pub fn with_modifier(mut self, modifier: i32) -> Self {
        self.modifier = clamp_modifier(modifier);
        self
    }

    /// Parse loose dice notation.
    ///
    /// The first `NdM` found anywhere in the text wins, so `"2d6 slashing"`
    /// parses as `2d6`. A bare integer is a die size (`"8"` is `1d8`).
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let compact: String = notation
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if compact.is_empty() {
            return Err(DiceError::NoDice);
        }

        let bytes = compact.as_bytes();
        let d_pos = (0..bytes.len()).find(|&i| {
            bytes[i] == b'd' && bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())
        });

        let Some(d_pos) = d_pos else {
            if compact.bytes().all(|b| b.is_ascii_digit()) {
                let sides = parse_number(&compact, notation)?;
                return Self::new(1, sides);
            }
            return Err(DiceError::InvalidNotation(notation.to_string()));
        };

        let count_start = compact[..d_pos]
            .rfind(|c: char| !c.is_ascii_digit())
            .map(|i| i + 1)
            .unwrap_or(0);
        let count_str = &compact[count_start..d_pos];
        let count = if count_str.is_empty() {
            1
        } else {
            parse_number(count_str, notation)?
        };

        let rest = &compact[d_pos + 1..];
        let sides_len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let sides = parse_number(&rest[..sides_len], notation)?;

        let mut expr = Self::new(count, sides)?;

        let tail = &rest[sides_len..];
        let sign = match tail.chars().next() {
            Some('+') => Some(1),
            Some('-') => Some(-1),
            _ => None,
        };
        if let Some(sign) = sign {
            let digits: String = tail[1..].chars().take_while(|c| c.is_ascii_digit()).collect();
            if !digits.is_empty() {
                // Too many digits for i64 is still "huge".
                let value = digits.parse::<i64>().unwrap_or(i64::MAX).min(MAX_MODIFIER as i64);
                expr.modifier = sign * value as i32;
            }
        }

        Ok(expr)
    }

    /// Parse, falling back to `1d4` when the notation is unusable.
    pub fn normalize(notation: &str) -> Self {
        match Self::parse(notation) {
            Ok(expr) => expr,
            Err(e) => {
                tracing::warn!(notation, error = %e, "Falling back to 1d4");
                Self::FALLBACK
            }
        }
    }

    pub fn is_single_d20(&self) -> bool {
        self.count == 1 && self.sides == 20
    }

    /// The same dice with the count doubled (critical hits).
    pub fn doubled(&self) -> Self {
        Self {
            count: (self.count * 2).min(MAX_DICE * 2),
            ..*self
        }
    }

    /// Roll the expression plus `modifier`.
    pub fn roll(&self, modifier: i32, advantage: Advantage) -> RollResult {
        self.roll_with_rng(modifier, advantage, &mut OsRng)
    }

    /// Roll with a specific RNG (useful for testing).
    pub fn roll_with_rng<R: Rng + ?Sized>(
        &self,
        modifier: i32,
        advantage: Advantage,
        rng: &mut R,
    ) -> RollResult {
        let modifier = self.modifier.saturating_add(modifier);

        if self.is_single_d20() && advantage != Advantage::Normal {
            let roll1 = rng.gen_range(1..=20u32);
            let roll2 = rng.gen_range(1..=20u32);
            let chosen = match advantage {
                Advantage::Advantage => roll1.max(roll2),
                _ => roll1.min(roll2),
            };

            return RollResult {
                expression: *self,
                rolls: vec![roll1, roll2],
                modifier,
                total: (chosen as i32).saturating_add(modifier),
                advantage,
                natural_20: chosen == 20,
                natural_1: chosen == 1,
            };
        }

        let rolls: Vec<u32> = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();
        let dice_total = rolls
            .iter()
            .fold(0i32, |sum, &r| sum.saturating_add(r.min(i32::MAX as u32) as i32));
        let single_d20 = self.is_single_d20();

        RollResult {
            expression: *self,
            modifier,
            total: dice_total.saturating_add(modifier),
            advantage: Advantage::Normal,
            natural_20: single_d20 && rolls[0] == 20,
            natural_1: single_d20 && rolls[0] == 1,
            rolls,
        }
    }
}

pub fn clamp_modifier(modifier: i32) -> i32 {
    modifier.clamp(-MAX_MODIFIER, MAX_MODIFIER)
}

fn parse_number(digits: &str, notation: &str) -> Result<u32, DiceError> {
    digits
        .parse()
        .map_err(|_| DiceError::InvalidNotation(notation.to_string()))
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        if self.modifier != 0 {
            write!(f, "{:+}", self.modifier)?;
        }
        Ok(())
    }
}

/// Complete result of a dice roll. Never re-rolled once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub expression: DiceExpression,
    /// Every face drawn; both draws when advantage or disadvantage applied.
    pub rolls: Vec<u32>,
    /// Expression modifier plus any extra modifier passed to the roll.
    pub modifier: i32,
    pub total: i32,
    pub advantage: Advantage,
    pub natural_20: bool,
    pub natural_1: bool,
}

impl RollResult {
    /// The d20 face that counts, for single d20 rolls.
    pub fn selected_face(&self) -> Option<u32> {
        if !self.expression.is_single_d20() {
            return None;
        }
        match self.advantage {
            Advantage::Advantage => self.rolls.iter().copied().max(),
            Advantage::Disadvantage => self.rolls.iter().copied().min(),
            Advantage::Normal => self.rolls.first().copied(),
        }
    }

    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }

    /// Check if this was a critical hit (natural 20).
    pub fn is_critical(&self) -> bool {
        self.natural_20
    }

    /// Check if this was a critical failure (natural 1).
    pub fn is_fumble(&self) -> bool {
        self.natural_1
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mod_str = if self.modifier != 0 {
            format!(" {:+}", self.modifier)
        } else {
            String::new()
        };
        let adv = match self.advantage {
            Advantage::Advantage => " (adv)",
            Advantage::Disadvantage => " (dis)",
            Advantage::Normal => "",
        };
        let rolls = self
            .rolls
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{}d{}{adv}{mod_str} = [{rolls}]{mod_str} = {}",
            self.expression.count, self.expression.sides, self.total
        )?;
        if self.natural_20 {
            write!(f, " NAT 20!")?;
        } else if self.natural_1 {
            write!(f, " NAT 1!")?;
        }
        Ok(())
    }
}

/// Roll loose notation, falling back to `1d4` when it cannot be parsed.
pub fn roll(notation: &str, modifier: i32, advantage: Advantage) -> RollResult {
    DiceExpression::normalize(notation).roll(modifier, advantage)
}

pub fn roll_with_rng<R: Rng + ?Sized>(
    notation: &str,
    modifier: i32,
    advantage: Advantage,
    rng: &mut R,
) -> RollResult {
    DiceExpression::normalize(notation).roll_with_rng(modifier, advantage, rng)
}

/// 4d6 drop lowest, six times.
pub fn roll_ability_scores() -> [u8; 6] {
    roll_ability_scores_with_rng(&mut OsRng)
}

pub fn roll_ability_scores_with_rng<R: Rng + ?Sized>(rng: &mut R) -> [u8; 6] {
    let mut scores = [0u8; 6];
    for score in scores.iter_mut() {
        let mut four: Vec<u8> = (0..4).map(|_| rng.gen_range(1..=6u8)).collect();
        four.sort_unstable();
        *score = four[1..].iter().sum();
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn expr(count: u32, sides: u32, modifier: i32) -> DiceExpression {
        DiceExpression {
            count,
            sides,
            modifier,
        }
    }

    #[test]
    fn test_parse_simple() {
        assert_eq!(DiceExpression::parse("1d20").unwrap(), expr(1, 20, 0));
        assert_eq!(DiceExpression::parse("2d6+3").unwrap(), expr(2, 6, 3));
        assert_eq!(DiceExpression::parse("1d8-1").unwrap(), expr(1, 8, -1));
    }

    #[test]
    fn test_parse_loose_forms() {
        assert_eq!(DiceExpression::parse("d8").unwrap(), expr(1, 8, 0));
        assert_eq!(DiceExpression::parse("2 D 6").unwrap(), expr(2, 6, 0));
        assert_eq!(DiceExpression::parse("8").unwrap(), expr(1, 8, 0));
        assert_eq!(DiceExpression::parse(" 2d6 + 2 ").unwrap(), expr(2, 6, 2));
        assert_eq!(
            DiceExpression::parse("1d8 slashing").unwrap(),
            expr(1, 8, 0)
        );
        assert_eq!(
            DiceExpression::parse("dagger 1d4").unwrap(),
            expr(1, 4, 0)
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(DiceExpression::parse(""), Err(DiceError::NoDice));
        assert!(matches!(
            DiceExpression::parse("lots"),
            Err(DiceError::InvalidNotation(_))
        ));
        assert_eq!(DiceExpression::parse("0d6"), Err(DiceError::InvalidCount(0)));
        assert_eq!(DiceExpression::parse("1d1"), Err(DiceError::InvalidDieSize(1)));
        assert_eq!(
            DiceExpression::parse("1000d6"),
            Err(DiceError::InvalidCount(1000))
        );
    }

    #[test]
    fn test_parse_clamps_huge_modifier() {
        assert_eq!(DiceExpression::parse("1d6+2147483647").unwrap(), expr(1, 6, MAX_MODIFIER));
        assert_eq!(
            DiceExpression::parse("1d4-99999999999999999999999").unwrap(),
            expr(1, 4, -MAX_MODIFIER)
        );
        assert_eq!(expr(1, 4, 0).with_modifier(i32::MIN).modifier, -MAX_MODIFIER);
    }

    #[test]
    fn test_roll_saturates_extreme_modifiers() {
        let mut rng = StdRng::seed_from_u64(19);
        let result = expr(1, 6, 5).roll_with_rng(i32::MAX, Advantage::Normal, &mut rng);
        assert_eq!(result.modifier, i32::MAX);
        assert_eq!(result.total, i32::MAX);

        let result = DiceExpression::D20.roll_with_rng(i32::MAX, Advantage::Advantage, &mut rng);
        assert_eq!(result.total, i32::MAX);

        let result = expr(1, 6, -5).roll_with_rng(i32::MIN, Advantage::Normal, &mut rng);
        assert_eq!(result.modifier, i32::MIN);
        assert!(result.total < 0);
    }

    #[test]
    fn test_normalize_falls_back_to_d4() {
        assert_eq!(DiceExpression::normalize("a fistful"), DiceExpression::FALLBACK);
        assert_eq!(DiceExpression::normalize(""), DiceExpression::FALLBACK);
        assert_eq!(DiceExpression::normalize("3d10"), expr(3, 10, 0));
    }

    #[test]
    fn test_display_canonical() {
        assert_eq!(DiceExpression::parse("2 D 6").unwrap().to_string(), "2d6");
        assert_eq!(DiceExpression::parse("d8+2").unwrap().to_string(), "1d8+2");
        assert_eq!(DiceExpression::parse("1d8-1").unwrap().to_string(), "1d8-1");
    }

    #[test]
    fn test_total_is_sum_plus_modifier() {
        let mut rng = StdRng::seed_from_u64(7);
        for notation in ["1d20", "2d6+3", "4d4-2", "10d8", "d12+1"] {
            let e = DiceExpression::parse(notation).unwrap();
            for _ in 0..200 {
                let result = e.roll_with_rng(2, Advantage::Normal, &mut rng);
                assert_eq!(result.rolls.len(), e.count as usize);
                let sum: i32 = result.rolls.iter().map(|&r| r as i32).sum();
                assert_eq!(result.total, sum + e.modifier + 2);
                assert!(result.rolls.iter().all(|&r| r >= 1 && r <= e.sides));
            }
        }
    }

    #[test]
    fn test_advantage_selects_max() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let result = DiceExpression::D20.roll_with_rng(3, Advantage::Advantage, &mut rng);
            assert_eq!(result.rolls.len(), 2);
            let best = result.rolls[0].max(result.rolls[1]);
            assert_eq!(result.selected_face(), Some(best));
            assert_eq!(result.total, best as i32 + 3);
            assert_eq!(result.natural_20, best == 20);
            assert_eq!(result.natural_1, best == 1);
        }
    }

    #[test]
    fn test_disadvantage_selects_min() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..500 {
            let result = DiceExpression::D20.roll_with_rng(0, Advantage::Disadvantage, &mut rng);
            assert_eq!(result.rolls.len(), 2);
            let worst = result.rolls[0].min(result.rolls[1]);
            assert_eq!(result.total, worst as i32);
            assert_eq!(result.natural_20, worst == 20);
            assert_eq!(result.natural_1, worst == 1);
        }
    }

    #[test]
    fn test_advantage_ignored_for_other_dice() {
        let mut rng = StdRng::seed_from_u64(17);
        let result = expr(2, 20, 0).roll_with_rng(0, Advantage::Advantage, &mut rng);
        assert_eq!(result.rolls.len(), 2);
        assert_eq!(result.advantage, Advantage::Normal);
        assert!(!result.natural_20 && !result.natural_1);
        assert_eq!(result.total, (result.rolls[0] + result.rolls[1]) as i32);
    }

    #[test]
    fn test_advantage_skews_high() {
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 10_000;
        let mut adv_sum = 0u64;
        let mut dis_sum = 0u64;
        for _ in 0..draws {
            adv_sum += DiceExpression::D20
                .roll_with_rng(0, Advantage::Advantage, &mut rng)
                .total as u64;
            dis_sum += DiceExpression::D20
                .roll_with_rng(0, Advantage::Disadvantage, &mut rng)
                .total as u64;
        }
        // Uniform mean is 10.5; advantage is ~13.8, disadvantage ~7.2.
        let adv_mean = adv_sum as f64 / draws as f64;
        let dis_mean = dis_sum as f64 / draws as f64;
        assert!(adv_mean > 12.5, "advantage mean {adv_mean}");
        assert!(dis_mean < 8.5, "disadvantage mean {dis_mean}");
    }

    #[test]
    fn test_roll_uses_os_rng() {
        for _ in 0..100 {
            let result = roll("1d20", 5, Advantage::Normal);
            assert!(result.total >= 6 && result.total <= 25);
        }
    }

    #[test]
    fn test_doubled() {
        assert_eq!(expr(2, 6, 3).doubled(), expr(4, 6, 3));
    }

    #[test]
    fn test_advantage_combine() {
        assert_eq!(
            Advantage::Normal.combine(Advantage::Advantage),
            Advantage::Advantage
        );
        assert_eq!(
            Advantage::Advantage.combine(Advantage::Disadvantage),
            Advantage::Normal
        );
        assert_eq!(Advantage::from_flags(true, true), Advantage::Normal);
        assert_eq!(Advantage::from_flags(false, true), Advantage::Disadvantage);
    }

    #[test]
    fn test_display_roll() {
        let result = RollResult {
            expression: DiceExpression::D20,
            rolls: vec![20],
            modifier: 3,
            total: 23,
            advantage: Advantage::Normal,
            natural_20: true,
            natural_1: false,
        };
        assert_eq!(result.to_string(), "1d20 +3 = [20] +3 = 23 NAT 20!");
    }

    #[test]
    fn test_ability_scores_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let scores = roll_ability_scores_with_rng(&mut rng);
            assert!(scores.iter().all(|&s| (3..=18).contains(&s)));
        }
    }
}
