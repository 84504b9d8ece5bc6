//! Property tests for the issue lifecycle invariants.
//!
//! Drives random interleavings of create/close operations for a fixed
//! room and checks, after every step, that the store upholds:
//!
//! - every resident issue is active and carries at least one active alert
//! - at most one active issue exists per room

use chrono::Utc;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use smee_cache::IssueCache;
use smee_core::stores::IssueStore;
use smee_core::types::{Alert, DeviceRef};

const ROOM: &str = "ITB-1101";

#[derive(Debug, Clone)]
enum Op {
    Create { device: u8, alert_type: u8 },
    Close { pick: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4, 0u8..3).prop_map(|(device, alert_type)| Op::Create { device, alert_type }),
        (0u8..=255).prop_map(|pick| Op::Close { pick }),
    ]
}

fn make_alert(device: u8, alert_type: u8) -> Alert {
    Alert {
        device: DeviceRef::new(ROOM, format!("{ROOM}-D{device}")),
        alert_type: format!("type-{alert_type}"),
        start: Utc::now(),
        ..Default::default()
    }
}

async fn check_invariants(store: &IssueCache) -> Result<(), TestCaseError> {
    let issues = store
        .active_issues()
        .await
        .map_err(|e| TestCaseError::fail(e.to_string()))?;

    for issue in &issues {
        // Invariant A: resident == active == has an active alert
        prop_assert!(issue.active());
        prop_assert!(issue.has_active_alerts());
    }

    // Invariant B: one active issue per room
    prop_assert!(issues.iter().filter(|i| i.room.id == ROOM).count() <= 1);

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn lifecycle_invariants_hold_under_random_interleavings(
        ops in proptest::collection::vec(op_strategy(), 1..48),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        rt.block_on(async move {
            let store = IssueCache::new();

            for op in ops {
                match op {
                    Op::Create { device, alert_type } => {
                        store
                            .create_alert(make_alert(device, alert_type))
                            .await
                            .map_err(|e| TestCaseError::fail(e.to_string()))?;
                    }
                    Op::Close { pick } => {
                        let alerts = store
                            .active_alerts()
                            .await
                            .map_err(|e| TestCaseError::fail(e.to_string()))?;
                        if alerts.is_empty() {
                            continue;
                        }
                        let target = &alerts[pick as usize % alerts.len()];
                        store
                            .close_alert(&target.issue_id, &target.id)
                            .await
                            .map_err(|e| TestCaseError::fail(e.to_string()))?;
                    }
                }

                check_invariants(&store).await?;
            }

            Ok::<(), TestCaseError>(())
        })?;
    }
}
