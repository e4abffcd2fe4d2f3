//! Recommendation application
//!
//! Merges accepted recommendations into a single settings patch, applies it to
//! the live settings in one step, and retires the consumed recommendations.

use crate::analytics::types::{Priority, Recommendation};
use crate::settings::{merge_patch, SettingsPatch, SettingsTarget};
use serde::{Deserialize, Serialize};

/// Priorities included in a batch apply by default
pub const DEFAULT_BATCH_PRIORITIES: [Priority; 2] = [Priority::High, Priority::Medium];

/// Outcome of an apply request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    /// The merged patch was applied
    Applied,
    /// No active recommendation has the requested id
    NotFound,
    /// The batch filter matched no active recommendation
    NothingToApply,
    /// The settings target refused the patch; nothing changed
    Rejected(String),
    /// An analysis cycle is in flight
    Busy,
}

/// What an apply request changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub status: ApplyStatus,
    /// Ids of the consumed recommendations, in application order
    pub applied_ids: Vec<String>,
    /// Descriptions of the consumed recommendations
    pub descriptions: Vec<String>,
    /// The merged patch handed to the settings target
    pub patch: SettingsPatch,
}

impl ApplySummary {
    fn with_status(status: ApplyStatus) -> Self {
        Self {
            status,
            applied_ids: Vec::new(),
            descriptions: Vec::new(),
            patch: SettingsPatch::new(),
        }
    }

    pub fn busy() -> Self {
        Self::with_status(ApplyStatus::Busy)
    }

    /// Number of recommendations applied
    pub fn count(&self) -> usize {
        self.applied_ids.len()
    }

    pub fn is_applied(&self) -> bool {
        self.status == ApplyStatus::Applied
    }
}

/// Fold the actions left to right; later keys win
pub fn merge_actions<'a>(recs: impl IntoIterator<Item = &'a Recommendation>) -> SettingsPatch {
    let mut merged = SettingsPatch::new();
    for rec in recs {
        merge_patch(&mut merged, &rec.action);
    }
    merged
}

/// Apply the recommendation `id` and remove it from `active`.
///
/// An unknown id is reported as [`ApplyStatus::NotFound`] and changes nothing.
pub fn apply_single<T: SettingsTarget + ?Sized>(
    active: &mut Vec<Recommendation>,
    id: &str,
    target: &mut T,
) -> ApplySummary {
    let Some(position) = active.iter().position(|r| r.id == id) else {
        log::debug!("Recommendation {id} is not active");
        return ApplySummary::with_status(ApplyStatus::NotFound);
    };

    commit(active, vec![position], target)
}

/// Apply every active recommendation whose priority is in `filter`.
///
/// Selection order is fixed: all `high` first, then all `medium`, each in
/// generation order. `low` recommendations are never batch-applied.
pub fn apply_batch<T: SettingsTarget + ?Sized>(
    active: &mut Vec<Recommendation>,
    filter: &[Priority],
    target: &mut T,
) -> ApplySummary {
    let mut selected = Vec::new();
    for priority in DEFAULT_BATCH_PRIORITIES {
        if !filter.contains(&priority) {
            continue;
        }
        selected.extend(
            active
                .iter()
                .enumerate()
                .filter(|(_, r)| r.priority == priority)
                .map(|(i, _)| i),
        );
    }

    if selected.is_empty() {
        return ApplySummary::with_status(ApplyStatus::NothingToApply);
    }

    commit(active, selected, target)
}

/// Merge the selected recommendations, apply once, then retire them
fn commit<T: SettingsTarget + ?Sized>(
    active: &mut Vec<Recommendation>,
    selected: Vec<usize>,
    target: &mut T,
) -> ApplySummary {
    let patch = merge_actions(selected.iter().map(|&i| &active[i]));

    if let Err(e) = target.apply_patch(&patch) {
        log::warn!("Settings patch rejected: {e}");
        let mut summary = ApplySummary::with_status(ApplyStatus::Rejected(e.to_string()));
        summary.patch = patch;
        return summary;
    }

    let applied_ids: Vec<String> = selected.iter().map(|&i| active[i].id.clone()).collect();
    let descriptions: Vec<String> = selected
        .iter()
        .map(|&i| active[i].description.clone())
        .collect();

    let mut index = 0;
    active.retain(|_| {
        let keep = !selected.contains(&index);
        index += 1;
        keep
    });

    log::info!("Applied recommendations: {}", applied_ids.join(", "));

    ApplySummary {
        status: ApplyStatus::Applied,
        applied_ids,
        descriptions,
        patch,
    }
}
