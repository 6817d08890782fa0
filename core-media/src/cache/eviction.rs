//! Eviction ranking and planning.
//!
//! Candidates are Ready, unpinned assets. They are ranked by
//! `(last_watched_at, downloaded_at, id)` ascending, where a never-watched
//! asset sorts before any watched one.

use chrono::{DateTime, Utc};

use crate::cache::metadata::AssetMetadata;

type RankKey<'a> = (Option<DateTime<Utc>>, DateTime<Utc>, &'a str);

fn rank_key(asset: &AssetMetadata) -> RankKey<'_> {
    (asset.last_watched_at, asset.downloaded_at, asset.id.as_str())
}

/// Order assets from first-to-evict to last.
pub fn rank_candidates<'a, I, F>(assets: I, is_pinned: F) -> Vec<&'a AssetMetadata>
where
    I: IntoIterator<Item = &'a AssetMetadata>,
    F: Fn(&str) -> bool,
{
    let mut candidates: Vec<&AssetMetadata> = assets
        .into_iter()
        .filter(|a| a.is_ready() && !is_pinned(&a.id))
        .collect();
    candidates.sort_by(|a, b| rank_key(a).cmp(&rank_key(b)));
    candidates
}

/// Assets chosen for eviction and the bytes they free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    pub victims: Vec<(String, u64)>,
    pub freed_bytes: u64,
    /// Whether the plan frees at least the requested amount
    pub satisfied: bool,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.victims.is_empty()
    }
}

/// Pick victims in rank order until `shortfall` bytes are freed.
///
/// When the candidates cannot cover the shortfall the plan still lists all of
/// them, with `satisfied` unset; callers decide whether to act on it.
pub fn plan_eviction(ranked: &[&AssetMetadata], shortfall: u64) -> EvictionPlan {
    let mut plan = EvictionPlan {
        satisfied: shortfall == 0,
        ..EvictionPlan::default()
    };

    for asset in ranked {
        if plan.satisfied {
            break;
        }
        plan.victims.push((asset.id.clone(), asset.size_bytes));
        plan.freed_bytes += asset.size_bytes;
        plan.satisfied = plan.freed_bytes >= shortfall;
    }

    plan
}
