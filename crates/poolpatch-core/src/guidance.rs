//! Guidance evaluation and the remediation table
//!
//! Guidance sets are canonicalized as `BTreeSet`s; the legal combinations
//! and the steps each one needs live in a single lookup table keyed by the
//! set's sorted contents.

use std::collections::BTreeSet;

use poolpatch_api::Guidance;
use poolpatch_repo::UpdateInfoIndex;
use tracing::warn;

use crate::error::CoreError;

/// Canonical guidance set
pub type GuidanceSet = BTreeSet<Guidance>;

/// Which guidance list of an update to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceKind {
    /// Act on right after applying
    Recommended,
    /// Required eventually; reported but never executed here
    Absolute,
}

/// One action taken on a host after its updates are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationStep {
    RebootHost,
    /// Live-migrate every running VM with a device model onto the same host.
    /// When `skip_if_evacuated` is set the step is skipped, because the host
    /// is evacuated anyway, unless the pool has a single host.
    RestartDeviceModels { skip_if_evacuated: bool },
    RestartToolstack,
}

use Guidance::{EvacuateHost, RebootHost, RestartDeviceModel, RestartToolstack};

/// Every legal guidance set, keyed by its sorted contents
pub static REMEDIATION_TABLE: &[(&[Guidance], &[RemediationStep])] = &[
    (&[], &[]),
    (&[RebootHost], &[RemediationStep::RebootHost]),
    (&[EvacuateHost], &[]),
    (
        &[RestartDeviceModel],
        &[RemediationStep::RestartDeviceModels {
            skip_if_evacuated: false,
        }],
    ),
    (&[RestartToolstack], &[RemediationStep::RestartToolstack]),
    (
        &[EvacuateHost, RestartToolstack],
        &[RemediationStep::RestartToolstack],
    ),
    (
        &[RestartDeviceModel, RestartToolstack],
        &[
            RemediationStep::RestartDeviceModels {
                skip_if_evacuated: false,
            },
            RemediationStep::RestartToolstack,
        ],
    ),
    (
        &[EvacuateHost, RestartDeviceModel],
        &[RemediationStep::RestartDeviceModels {
            skip_if_evacuated: true,
        }],
    ),
    (
        &[EvacuateHost, RestartDeviceModel, RestartToolstack],
        &[
            RemediationStep::RestartDeviceModels {
                skip_if_evacuated: true,
            },
            RemediationStep::RestartToolstack,
        ],
    ),
];

/// Union the guidance of `update_ids` for `kind`
///
/// Ids missing from `index` are skipped. `RebootHost` subsumes every other
/// guidance.
pub fn evaluate<'a, I>(index: &UpdateInfoIndex, update_ids: I, kind: GuidanceKind) -> GuidanceSet
where
    I: IntoIterator<Item = &'a str>,
{
    let mut set = GuidanceSet::new();

    for id in update_ids {
        let Some(info) = index.get(id) else {
            warn!(update_id = id, "update not found in update-info, skipping");
            continue;
        };
        let guidance = match kind {
            GuidanceKind::Recommended => &info.recommended_guidance,
            GuidanceKind::Absolute => &info.absolute_guidance,
        };
        set.extend(guidance.iter().copied());
    }

    if set.contains(&RebootHost) {
        return GuidanceSet::from([RebootHost]);
    }
    set
}

/// Steps for `set`, or `None` if it is not a legal combination
#[must_use]
pub fn remediation_plan(set: &GuidanceSet) -> Option<&'static [RemediationStep]> {
    let key: Vec<Guidance> = set.iter().copied().collect();
    REMEDIATION_TABLE
        .iter()
        .find(|(legal, _)| *legal == key.as_slice())
        .map(|(_, steps)| *steps)
}

/// Check that `set` is one of the legal combinations
///
/// # Errors
/// Returns `CoreError::InvalidGuidanceCombination` otherwise
pub fn assert_valid(host: &str, set: &GuidanceSet) -> Result<(), CoreError> {
    match remediation_plan(set) {
        Some(_) => Ok(()),
        None => Err(CoreError::InvalidGuidanceCombination {
            host: host.to_string(),
            guidance: set.iter().copied().collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use poolpatch_repo::UpdateInfo;

    use super::*;

    fn update(id: &str, recommended: &[Guidance], absolute: &[Guidance]) -> UpdateInfo {
        UpdateInfo {
            id: id.to_string(),
            summary: String::new(),
            description: String::new(),
            update_type: "bugfix".to_string(),
            severity: None,
            recommended_guidance: recommended.to_vec(),
            absolute_guidance: absolute.to_vec(),
            packages: vec![],
        }
    }

    fn index(updates: Vec<UpdateInfo>) -> UpdateInfoIndex {
        updates.into_iter().map(|u| (u.id.clone(), u)).collect()
    }

    /// Every subset of the four guidances
    fn all_subsets() -> Vec<GuidanceSet> {
        (0u8..16)
            .map(|mask| {
                Guidance::ALL
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| mask & (1 << bit) != 0)
                    .map(|(_, g)| *g)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_assert_valid_accepts_exactly_the_table() {
        let legal: Vec<GuidanceSet> = vec![
            GuidanceSet::new(),
            GuidanceSet::from([RebootHost]),
            GuidanceSet::from([EvacuateHost]),
            GuidanceSet::from([RestartDeviceModel]),
            GuidanceSet::from([RestartToolstack]),
            GuidanceSet::from([EvacuateHost, RestartToolstack]),
            GuidanceSet::from([RestartDeviceModel, RestartToolstack]),
            GuidanceSet::from([EvacuateHost, RestartDeviceModel]),
            GuidanceSet::from([EvacuateHost, RestartDeviceModel, RestartToolstack]),
        ];

        for set in all_subsets() {
            let result = assert_valid("host-1", &set);
            if legal.contains(&set) {
                assert!(result.is_ok(), "{set:?} should be legal");
            } else {
                assert!(
                    matches!(result, Err(CoreError::InvalidGuidanceCombination { .. })),
                    "{set:?} should be rejected"
                );
            }
        }
    }

    #[test]
    fn test_table_keys_are_canonical_and_unique() {
        let mut seen = BTreeSet::new();
        for (key, _) in REMEDIATION_TABLE {
            assert!(key.windows(2).all(|w| w[0] < w[1]), "{key:?} is not sorted");
            assert!(seen.insert(key.to_vec()), "{key:?} appears twice");
        }
    }

    #[test]
    fn test_evaluate_is_order_independent() {
        let index = index(vec![
            update("A", &[RestartToolstack], &[]),
            update("B", &[RestartDeviceModel], &[]),
            update("C", &[EvacuateHost], &[RebootHost]),
        ]);

        let orders = [
            ["A", "B", "C"],
            ["A", "C", "B"],
            ["B", "A", "C"],
            ["B", "C", "A"],
            ["C", "A", "B"],
            ["C", "B", "A"],
        ];
        let expected = GuidanceSet::from([EvacuateHost, RestartDeviceModel, RestartToolstack]);
        for order in orders {
            assert_eq!(evaluate(&index, order, GuidanceKind::Recommended), expected);
        }
    }

    #[test]
    fn test_reboot_subsumes_everything() {
        let index = index(vec![
            update("kernel", &[RebootHost], &[]),
            update("xapi", &[RestartToolstack], &[]),
        ]);

        let set = evaluate(&index, ["xapi", "kernel"], GuidanceKind::Recommended);
        assert_eq!(set, GuidanceSet::from([RebootHost]));
        assert_eq!(remediation_plan(&set), Some(&[RemediationStep::RebootHost][..]));
    }

    #[test]
    fn test_evaluate_absolute_and_unknown_ids() {
        let index = index(vec![update("C", &[EvacuateHost], &[RebootHost])]);

        assert_eq!(
            evaluate(&index, ["C", "missing"], GuidanceKind::Absolute),
            GuidanceSet::from([RebootHost])
        );
        assert!(evaluate(&index, ["missing"], GuidanceKind::Recommended).is_empty());
    }

    #[test]
    fn test_invalid_combination_reports_host_and_set() {
        let set = GuidanceSet::from([RebootHost, RestartToolstack]);
        match assert_valid("host-7", &set) {
            Err(CoreError::InvalidGuidanceCombination { host, guidance }) => {
                assert_eq!(host, "host-7");
                assert_eq!(guidance, vec![RebootHost, RestartToolstack]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
