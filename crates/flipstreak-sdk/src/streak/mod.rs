//! 连胜领域模型
//!
//! 连胜值 = 自上次未命中以来，连续与所选面一致的投掷次数。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FlipStreakError;

mod store;

pub use store::LocalStreakStore;

/// 硬币的一面（玩家开局时选定，之后不可更改）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Heads,
    Tails,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Heads => "heads",
            Side::Tails => "tails",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = FlipStreakError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heads" | "h" => Ok(Side::Heads),
            "tails" | "t" => Ok(Side::Tails),
            other => Err(FlipStreakError::InvalidArgument(format!("未知的硬币面: {}", other))),
        }
    }
}

/// 单次投掷记录（仅用于 UI 展示，不参与同步）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlipRecord {
    pub outcome: Side,
    pub matched: bool,
    pub streak_after: u32,
    pub at_ms: i64,
}

/// 根据一次投掷结果计算新的连胜值
pub fn next_streak(current: u32, chosen: Side, outcome: Side) -> u32 {
    if outcome == chosen {
        current.saturating_add(1)
    } else {
        0
    }
}

/// 从按时间先后排列的投掷结果重新计算连胜值（末尾连续命中数）
pub fn streak_from_outcomes<I>(chosen: Side, outcomes: I) -> u32
where
    I: IntoIterator<Item = Side>,
{
    outcomes
        .into_iter()
        .fold(0, |streak, outcome| next_streak(streak, chosen, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parsing_and_display() {
        assert_eq!("Heads".parse::<Side>().unwrap(), Side::Heads);
        assert_eq!("t".parse::<Side>().unwrap(), Side::Tails);
        assert!("edge".parse::<Side>().is_err());
        assert_eq!(Side::Tails.to_string(), "tails");
    }

    #[test]
    fn side_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Heads).unwrap(), "\"heads\"");
        let side: Side = serde_json::from_str("\"tails\"").unwrap();
        assert_eq!(side, Side::Tails);
    }

    #[test]
    fn trailing_matches_are_counted() {
        use Side::*;
        assert_eq!(streak_from_outcomes(Heads, Vec::new()), 0);
        assert_eq!(streak_from_outcomes(Heads, vec![Heads, Heads, Heads]), 3);
        assert_eq!(streak_from_outcomes(Heads, vec![Heads, Heads, Tails]), 0);
        assert_eq!(streak_from_outcomes(Heads, vec![Heads, Tails, Heads, Heads]), 2);
        assert_eq!(streak_from_outcomes(Tails, vec![Heads, Tails, Tails]), 2);
    }

    #[test]
    fn trailing_matches_for_pseudo_random_sequences() {
        // 线性同余生成的固定序列，与逐条数末尾命中数的朴素算法对比
        let mut seed: u64 = 42;
        for _ in 0..50 {
            let mut outcomes = Vec::new();
            for _ in 0..(seed % 30) {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                outcomes.push(if (seed >> 33) & 1 == 0 { Side::Heads } else { Side::Tails });
            }
            let expected = outcomes.iter().rev().take_while(|&&o| o == Side::Heads).count() as u32;
            assert_eq!(streak_from_outcomes(Side::Heads, outcomes), expected);
            seed = seed.wrapping_add(7);
        }
    }
}
