//! Deterministic leaderboard ranking over a snapshot of learner state.
//!
//! Rank is a pure projection of the full set of XP totals: it is recomputed
//! from a consistent snapshot on every request and never persisted or
//! incrementally patched, so all readers of the same snapshot agree.

use serde::{Deserialize, Serialize};

use crate::model::{LearnerProgressionState, UserId};

//
// ─── ENTRIES ───────────────────────────────────────────────────────────────────
//

/// Derived leaderboard row. Never stored; always computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub total_xp: u64,
    /// 1-based competition rank; equal XP shares a rank.
    pub rank: u32,
    pub level: u32,
    pub current_streak: u32,
    pub tests_completed: u32,
}

//
// ─── RANKING ───────────────────────────────────────────────────────────────────
//

/// Ranks every learner in the snapshot by total XP descending.
///
/// Standard competition ranking: learners with equal XP share the rank of
/// the first learner in their run, and the next distinct XP value lands at
/// its 1-based position (so gaps follow tie groups). Ties are ordered by
/// user ID only for a stable display order; their rank is identical either
/// way.
#[must_use]
pub fn rank(snapshot: &[LearnerProgressionState]) -> Vec<LeaderboardEntry> {
    let mut ordered: Vec<&LearnerProgressionState> = snapshot.iter().collect();
    ordered.sort_by(|a, b| {
        b.total_xp()
            .cmp(&a.total_xp())
            .then_with(|| a.user_id().cmp(&b.user_id()))
    });

    let mut entries = Vec::with_capacity(ordered.len());
    let mut current_rank = 0u32;
    let mut previous_xp: Option<u64> = None;

    for (position, learner) in ordered.iter().enumerate() {
        if previous_xp != Some(learner.total_xp()) {
            current_rank = position as u32 + 1;
            previous_xp = Some(learner.total_xp());
        }
        entries.push(LeaderboardEntry {
            user_id: learner.user_id(),
            display_name: learner.display_name().to_string(),
            total_xp: learner.total_xp(),
            rank: current_rank,
            level: learner.level(),
            current_streak: learner.current_streak(),
            tests_completed: learner.total_tests_completed(),
        });
    }

    entries
}

/// Resolves one learner's rank against the full population.
///
/// Counting learners with strictly greater XP gives the same answer as
/// [`rank`] without materializing the whole board, so a learner outside a
/// bounded top-N window still resolves correctly.
#[must_use]
pub fn rank_of(user_id: UserId, snapshot: &[LearnerProgressionState]) -> Option<u32> {
    let me = snapshot.iter().find(|l| l.user_id() == user_id)?;
    let greater = snapshot
        .iter()
        .filter(|l| l.total_xp() > me.total_xp())
        .count();
    Some(greater as u32 + 1)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
