//! Pure gamification math: XP awards, levels, streaks, and badge grants.
//!
//! Nothing here touches a clock or a store. The coordinator supplies every
//! input (including "today") and applies the outputs in its atomic commit,
//! so the same inputs always produce the same awards no matter how often a
//! submission is retried.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

//
// ─── LEVELS ────────────────────────────────────────────────────────────────────
//

/// XP required to go from level 1 to level 2.
const LEVEL_BASE_XP: u64 = 100;
/// Each level's requirement is its predecessor's times 3/2, floored.
const LEVEL_GROWTH_NUM: u64 = 3;
const LEVEL_GROWTH_DEN: u64 = 2;
/// Levels beyond this saturate; geometric growth makes it unreachable.
const MAX_LEVEL: u32 = 100;

/// Cumulative XP thresholds: `thresholds[n-1]` is the total XP at which a
/// learner reaches level `n`. Precomputed once so every caller sees the
/// identical table.
fn thresholds() -> &'static [u64] {
    static TABLE: OnceLock<Vec<u64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = Vec::with_capacity(MAX_LEVEL as usize);
        table.push(0); // level 1
        let mut requirement = LEVEL_BASE_XP;
        let mut cumulative = 0u64;
        for _ in 2..=MAX_LEVEL {
            cumulative = cumulative.saturating_add(requirement);
            table.push(cumulative);
            requirement = requirement
                .saturating_mul(LEVEL_GROWTH_NUM)
                / LEVEL_GROWTH_DEN;
        }
        table
    })
}

/// Level reached with the given cumulative XP.
#[must_use]
pub fn level_from_xp(total_xp: u64) -> u32 {
    thresholds().partition_point(|&t| t <= total_xp) as u32
}

/// Cumulative XP at which the given level is reached.
///
/// Strict inverse of [`level_from_xp`]: `level_from_xp(xp_for_level(n)) == n`
/// for every level in range. Level 0 and 1 both require nothing; levels past
/// the cap return the top threshold.
#[must_use]
pub fn xp_for_level(level: u32) -> u64 {
    let table = thresholds();
    match level {
        0 | 1 => 0,
        n if (n as usize) <= table.len() => table[n as usize - 1],
        _ => *table.last().unwrap_or(&0),
    }
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Tunable constants for XP awards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamificationConfig {
    /// Flat award for finishing any test.
    pub base_completion_xp: u32,
    /// Tiered bonus by percentage score.
    pub tier_90_bonus: u32,
    pub tier_80_bonus: u32,
    pub tier_70_bonus: u32,
    /// Extra flat bonus at exactly 100%.
    pub perfect_bonus: u32,
    /// Time bonus starts here and loses one XP per elapsed minute, floored
    /// at zero.
    pub time_bonus_budget_minutes: u32,
    /// XP per day of the streak held *before* this submission.
    pub streak_bonus_per_day: u32,
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            base_completion_xp: 50,
            tier_90_bonus: 25,
            tier_80_bonus: 15,
            tier_70_bonus: 10,
            perfect_bonus: 25,
            time_bonus_budget_minutes: 20,
            streak_bonus_per_day: 2,
        }
    }
}

//
// ─── XP AWARD ──────────────────────────────────────────────────────────────────
//

/// Itemized XP award for one completed test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpBreakdown {
    pub base: u32,
    pub tier_bonus: u32,
    pub perfect_bonus: u32,
    pub time_bonus: u32,
    pub streak_bonus: u32,
}

impl XpBreakdown {
    #[must_use]
    pub fn total(&self) -> u32 {
        self.base + self.tier_bonus + self.perfect_bonus + self.time_bonus + self.streak_bonus
    }
}

/// Computes the XP award for one completed test.
///
/// `streak_before` is the learner's streak *before* this submission updates
/// it. Elapsed time past the budget never goes negative; every contribution
/// is a non-negative integer.
#[must_use]
pub fn xp_award(
    config: &GamificationConfig,
    percentage: u32,
    elapsed_minutes: i64,
    streak_before: u32,
) -> XpBreakdown {
    let tier_bonus = if percentage >= 90 {
        config.tier_90_bonus
    } else if percentage >= 80 {
        config.tier_80_bonus
    } else if percentage >= 70 {
        config.tier_70_bonus
    } else {
        0
    };

    let perfect_bonus = if percentage >= 100 {
        config.perfect_bonus
    } else {
        0
    };

    let elapsed = u32::try_from(elapsed_minutes.max(0)).unwrap_or(u32::MAX);
    let time_bonus = config.time_bonus_budget_minutes.saturating_sub(elapsed);

    XpBreakdown {
        base: config.base_completion_xp,
        tier_bonus,
        perfect_bonus,
        time_bonus,
        streak_bonus: config.streak_bonus_per_day.saturating_mul(streak_before),
    }
}

//
// ─── STREAKS ───────────────────────────────────────────────────────────────────
//

/// Streak counters after one day of activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakUpdate {
    pub current: u32,
    pub longest: u32,
}

/// Advances the activity streak for activity on `today`.
///
/// Same calendar day leaves the streak unchanged, exactly one elapsed day
/// increments it, any larger gap (or no prior activity) resets it to 1.
/// The caller supplies `today`; this function never reads the clock.
#[must_use]
pub fn advance_streak(
    last_activity: Option<NaiveDate>,
    current: u32,
    longest: u32,
    today: NaiveDate,
) -> StreakUpdate {
    let new_current = match last_activity {
        Some(last) => {
            let gap = (today - last).num_days();
            if gap <= 0 {
                // Same-day re-activity (or clock skew) never inflates the streak.
                current.max(1)
            } else if gap == 1 {
                current + 1
            } else {
                1
            }
        }
        None => 1,
    };

    StreakUpdate {
        current: new_current,
        longest: longest.max(new_current),
    }
}

//
// ─── BADGES ────────────────────────────────────────────────────────────────────
//

/// Metric a badge threshold applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BadgeCategory {
    /// Cumulative tests completed.
    TestsCompleted,
    /// Current streak length.
    StreakLength,
    /// Percentage score of a single test.
    TestScore,
}

/// One badge in the fixed catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub id: &'static str,
    pub name: &'static str,
    pub category: BadgeCategory,
    pub threshold: u32,
}

/// The fixed, ordered badge catalogue. Awarding is strictly additive;
/// badges are never revoked.
pub const BADGE_CATALOG: &[Badge] = &[
    Badge {
        id: "first-steps",
        name: "First Steps",
        category: BadgeCategory::TestsCompleted,
        threshold: 1,
    },
    Badge {
        id: "getting-serious",
        name: "Getting Serious",
        category: BadgeCategory::TestsCompleted,
        threshold: 5,
    },
    Badge {
        id: "scholar",
        name: "Scholar",
        category: BadgeCategory::TestsCompleted,
        threshold: 20,
    },
    Badge {
        id: "on-a-roll",
        name: "On a Roll",
        category: BadgeCategory::StreakLength,
        threshold: 3,
    },
    Badge {
        id: "week-warrior",
        name: "Week Warrior",
        category: BadgeCategory::StreakLength,
        threshold: 7,
    },
    Badge {
        id: "unstoppable",
        name: "Unstoppable",
        category: BadgeCategory::StreakLength,
        threshold: 30,
    },
    Badge {
        id: "high-achiever",
        name: "High Achiever",
        category: BadgeCategory::TestScore,
        threshold: 90,
    },
    Badge {
        id: "perfectionist",
        name: "Perfectionist",
        category: BadgeCategory::TestScore,
        threshold: 100,
    },
];

/// Post-submission metrics badges are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeMetrics {
    pub tests_completed: u32,
    pub current_streak: u32,
    pub score_percentage: u32,
}

/// Badges newly earned by this submission.
///
/// A badge is granted iff the learner does not already hold it and the
/// relevant post-submission metric meets its threshold. Several badges may
/// land at once.
#[must_use]
pub fn newly_earned_badges(held: &BTreeSet<String>, metrics: BadgeMetrics) -> Vec<&'static Badge> {
    BADGE_CATALOG
        .iter()
        .filter(|badge| !held.contains(badge.id))
        .filter(|badge| {
            let value = match badge.category {
                BadgeCategory::TestsCompleted => metrics.tests_completed,
                BadgeCategory::StreakLength => metrics.current_streak,
                BadgeCategory::TestScore => metrics.score_percentage,
            };
            value >= badge.threshold
        })
        .collect()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_one_starts_at_zero_xp() {
        assert_eq!(level_from_xp(0), 1);
        assert_eq!(level_from_xp(99), 1);
        assert_eq!(level_from_xp(100), 2);
    }

    #[test]
    fn level_requirements_grow_geometrically() {
        // 100, then 150, then 225 ...
        assert_eq!(xp_for_level(2), 100);
        assert_eq!(xp_for_level(3), 250);
        assert_eq!(xp_for_level(4), 475);
    }

    #[test]
    fn level_from_xp_inverts_xp_for_level() {
        for level in 1..=MAX_LEVEL {
            assert_eq!(level_from_xp(xp_for_level(level)), level, "level {level}");
        }
    }

    #[test]
    fn level_from_xp_is_monotone() {
        let mut previous = 0;
        for xp in (0..50_000).step_by(37) {
            let level = level_from_xp(xp);
            assert!(level >= previous);
            previous = level;
        }
    }

    #[test]
    fn level_saturates_at_cap() {
        assert_eq!(level_from_xp(u64::MAX), MAX_LEVEL);
        assert_eq!(xp_for_level(MAX_LEVEL + 50), xp_for_level(MAX_LEVEL));
    }

    #[test]
    fn xp_award_applies_score_tiers() {
        let config = GamificationConfig::default();
        assert_eq!(xp_award(&config, 95, 30, 0).tier_bonus, 25);
        assert_eq!(xp_award(&config, 85, 30, 0).tier_bonus, 15);
        assert_eq!(xp_award(&config, 72, 30, 0).tier_bonus, 10);
        assert_eq!(xp_award(&config, 69, 30, 0).tier_bonus, 0);
    }

    #[test]
    fn perfect_score_earns_both_tier_and_perfect_bonus() {
        let config = GamificationConfig::default();
        let award = xp_award(&config, 100, 30, 0);
        assert_eq!(award.tier_bonus, 25);
        assert_eq!(award.perfect_bonus, 25);
    }

    #[test]
    fn time_bonus_decays_linearly_and_floors_at_zero() {
        let config = GamificationConfig::default();
        assert_eq!(xp_award(&config, 50, 0, 0).time_bonus, 20);
        assert_eq!(xp_award(&config, 50, 5, 0).time_bonus, 15);
        assert_eq!(xp_award(&config, 50, 20, 0).time_bonus, 0);
        assert_eq!(xp_award(&config, 50, 500, 0).time_bonus, 0);
        // Clock skew reads as zero elapsed, never as a negative award.
        assert_eq!(xp_award(&config, 50, -3, 0).time_bonus, 20);
    }

    #[test]
    fn streak_bonus_uses_pre_submission_streak() {
        let config = GamificationConfig::default();
        assert_eq!(xp_award(&config, 50, 30, 4).streak_bonus, 8);
        assert_eq!(xp_award(&config, 50, 30, 0).streak_bonus, 0);
    }

    #[test]
    fn award_total_sums_components() {
        let config = GamificationConfig::default();
        let award = xp_award(&config, 90, 5, 1);
        assert_eq!(award.total(), 50 + 25 + 0 + 15 + 2);
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn same_day_activity_keeps_streak() {
        let update = advance_streak(Some(day(2024, 3, 9)), 4, 6, day(2024, 3, 9));
        assert_eq!(update, StreakUpdate { current: 4, longest: 6 });
    }

    #[test]
    fn next_day_activity_increments_streak() {
        let update = advance_streak(Some(day(2024, 3, 9)), 4, 4, day(2024, 3, 10));
        assert_eq!(update, StreakUpdate { current: 5, longest: 5 });
    }

    #[test]
    fn gap_resets_streak_but_not_longest() {
        let update = advance_streak(Some(day(2024, 3, 9)), 4, 9, day(2024, 3, 12));
        assert_eq!(update, StreakUpdate { current: 1, longest: 9 });
    }

    #[test]
    fn first_ever_activity_starts_streak_at_one() {
        let update = advance_streak(None, 0, 0, day(2024, 3, 9));
        assert_eq!(update, StreakUpdate { current: 1, longest: 1 });
    }

    #[test]
    fn badge_thresholds_award_once() {
        let mut held = BTreeSet::new();
        let earned = newly_earned_badges(
            &held,
            BadgeMetrics {
                tests_completed: 1,
                current_streak: 1,
                score_percentage: 95,
            },
        );
        let ids: Vec<&str> = earned.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["first-steps", "high-achiever"]);

        for badge in earned {
            held.insert(badge.id.to_string());
        }
        let again = newly_earned_badges(
            &held,
            BadgeMetrics {
                tests_completed: 2,
                current_streak: 2,
                score_percentage: 95,
            },
        );
        assert!(again.is_empty());
    }

    #[test]
    fn multiple_badges_can_land_in_one_submission() {
        let earned = newly_earned_badges(
            &BTreeSet::new(),
            BadgeMetrics {
                tests_completed: 5,
                current_streak: 3,
                score_percentage: 100,
            },
        );
        let ids: Vec<&str> = earned.iter().map(|b| b.id).collect();
        assert_eq!(
            ids,
            vec![
                "first-steps",
                "getting-serious",
                "on-a-roll",
                "high-achiever",
                "perfectionist"
            ]
        );
    }
}
