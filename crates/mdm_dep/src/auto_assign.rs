//! Profile auto-assignment for newly added devices.

use crate::assigner::{AutoAssigner, AutoAssignerStore};
use crate::client::{DepClient, ASSIGN_FAILED, ASSIGN_NOT_ACCESSIBLE, ASSIGN_SUCCESS};
use mdm_events::Device;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Totals from one auto-assignment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignSummary {
    /// Profiles an assign call was issued for.
    pub profiles: usize,
    /// Devices reported `SUCCESS`.
    pub success: usize,
    /// Devices reported `NOT_ACCESSIBLE`.
    pub not_accessible: usize,
    /// Devices reported `FAILED`.
    pub failed: usize,
    /// Assign calls that returned an error.
    pub errors: usize,
}

/// Groups the serials of added devices by the profile each rule assigns.
///
/// Serials are deduplicated per profile and keep roster order.
pub fn plan(devices: &[Device], assigners: &[AutoAssigner]) -> BTreeMap<String, Vec<String>> {
    let mut serials: Vec<&str> = Vec::new();
    for device in devices.iter().filter(|d| d.is_added()) {
        if !device.serial_number.is_empty() && !serials.contains(&device.serial_number.as_str()) {
            serials.push(&device.serial_number);
        }
    }

    let mut by_profile: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if serials.is_empty() {
        return by_profile;
    }
    for assigner in assigners.iter().filter(|a| a.matches_all()) {
        let batch = by_profile.entry(assigner.profile_uuid.clone()).or_default();
        for serial in &serials {
            if !batch.iter().any(|s| s == serial) {
                batch.push(serial.to_string());
            }
        }
    }
    by_profile
}

/// Assigns profiles to the added devices in `devices`.
///
/// Rules are read from `assigners` on every call. Failures are logged and do
/// not stop the remaining profiles.
pub async fn auto_assign(
    client: Arc<dyn DepClient>,
    assigners: AutoAssignerStore,
    devices: Vec<Device>,
) -> AssignSummary {
    let mut summary = AssignSummary::default();

    let rules = match assigners.load_all() {
        Ok(rules) => rules,
        Err(e) => {
            error!(error = %e, "failed to load auto-assigners");
            return summary;
        }
    };

    let batches = plan(&devices, &rules);
    if batches.is_empty() {
        debug!(devices = devices.len(), "nothing to auto-assign");
        return summary;
    }

    for (profile_uuid, serials) in batches {
        summary.profiles += 1;
        match client.assign_profile(&profile_uuid, &serials).await {
            Ok(result) => {
                let success = result.count(ASSIGN_SUCCESS);
                let not_accessible = result.count(ASSIGN_NOT_ACCESSIBLE);
                let failed = result.count(ASSIGN_FAILED);
                summary.success += success;
                summary.not_accessible += not_accessible;
                summary.failed += failed;
                info!(
                    %profile_uuid,
                    devices = serials.len(),
                    success,
                    not_accessible,
                    failed,
                    "profile auto-assigned"
                );
            }
            Err(e) => {
                summary.errors += 1;
                warn!(%profile_uuid, devices = serials.len(), error = %e, "auto-assign failed");
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ProfileAssignment;
    use crate::error::DepError;
    use crate::mock::MockDepClient;
    use mdm_events::OpType;
    use mdm_store::MapStore;

    fn roster() -> Vec<Device> {
        vec![
            Device::new("A", OpType::Added),
            Device::new("B", OpType::Modified),
            Device::new("C", OpType::Added),
            Device::new("A", OpType::Added),
            Device::new("D", OpType::Deleted),
        ]
    }

    #[test]
    fn plan_selects_added_devices() {
        let rules = vec![AutoAssigner::wildcard("P1")];
        let plan = plan(&roster(), &rules);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan["P1"], vec!["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn plan_ignores_other_filters() {
        let rules = vec![AutoAssigner::new("model:iPad", "P1")];
        assert!(plan(&roster(), &rules).is_empty());
    }

    #[test]
    fn plan_without_added_devices_is_empty() {
        let rules = vec![AutoAssigner::wildcard("P1")];
        let devices = vec![Device::new("B", OpType::Modified)];
        assert!(plan(&devices, &rules).is_empty());
    }

    #[tokio::test]
    async fn assigns_once_per_profile() {
        let store = AutoAssignerStore::new(MapStore::open_in_memory());
        store.save(&AutoAssigner::wildcard("P1")).unwrap();
        let mock = Arc::new(MockDepClient::new());

        let summary = auto_assign(mock.clone(), store, roster()).await;
        assert_eq!(summary.profiles, 1);
        assert_eq!(summary.success, 2);
        assert_eq!(
            mock.assign_calls(),
            vec![("P1".to_string(), vec!["A".to_string(), "C".to_string()])]
        );
    }

    #[tokio::test]
    async fn errors_are_counted() {
        let store = AutoAssignerStore::new(MapStore::open_in_memory());
        store.save(&AutoAssigner::wildcard("P1")).unwrap();
        let mock = Arc::new(MockDepClient::new());
        mock.push_assign(Err(DepError::api(500, "boom")));

        let summary = auto_assign(mock.clone(), store.clone(), roster()).await;
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.success, 0);

        mock.push_assign(Ok(ProfileAssignment {
            profile_uuid: "P1".into(),
            devices: [
                ("A".to_string(), ASSIGN_SUCCESS.to_string()),
                ("C".to_string(), ASSIGN_NOT_ACCESSIBLE.to_string()),
            ]
            .into_iter()
            .collect(),
        }));
        let summary = auto_assign(mock.clone(), store, roster()).await;
        assert_eq!(summary.success, 1);
        assert_eq!(summary.not_accessible, 1);
    }

    #[tokio::test]
    async fn no_rules_no_calls() {
        let store = AutoAssignerStore::new(MapStore::open_in_memory());
        let mock = Arc::new(MockDepClient::new());
        let summary = auto_assign(mock.clone(), store, roster()).await;
        assert_eq!(summary, AssignSummary::default());
        assert!(mock.calls().is_empty());
    }
}
