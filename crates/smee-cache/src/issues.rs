//! The resident issue/alert store.
//!
//! [`IssueCache`] owns the canonical issue/alert lifecycle. The resident
//! map holds exactly the active issues: closing the last active alert on
//! an issue closes the issue and evicts it, so "closed" issues leave the
//! hot set and remain queryable only through the persistent backing, if
//! one is configured.
//!
//! Every mutation runs under one write lock for the duration of the
//! in-memory update. When a backing store is configured the delegate call
//! happens while that lock is held, serializing all persistence I/O
//! through this single point so the resident view and the backing cannot
//! diverge under concurrent writers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use smee_core::error::{Error, Result};
use smee_core::stores::{IncidentStore, IssueStore};
use smee_core::types::{Alert, Incident, Issue, IssueEvent};

use crate::search::active_room_issue;

/// In-memory issue/alert store with optional write-through backing.
#[derive(Default)]
pub struct IssueCache {
    backing: Option<Arc<dyn IssueStore>>,
    incidents: Option<Arc<dyn IncidentStore>>,
    issues: RwLock<HashMap<String, Issue>>,
}

impl IssueCache {
    /// Creates an empty cache with no backing store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures a persistent backing store. Mutations delegate to it
    /// (under the cache lock) and mirror its result into the resident
    /// map.
    #[must_use]
    pub fn with_backing(mut self, backing: Arc<dyn IssueStore>) -> Self {
        self.backing = Some(backing);
        self
    }

    /// Configures the incident collaborator that receives narration
    /// events for linked incidents.
    #[must_use]
    pub fn with_incident_store(mut self, incidents: Arc<dyn IncidentStore>) -> Self {
        self.incidents = Some(incidents);
        self
    }

    /// Replaces the resident set with the backing store's active issues.
    ///
    /// Called once at startup. A cache without a backing store starts
    /// empty.
    pub async fn sync(&self) -> Result<()> {
        let mut issues = self.issues.write().await;
        issues.clear();

        if let Some(backing) = &self.backing {
            for issue in backing.active_issues().await? {
                issues.insert(issue.id.clone(), issue);
            }
        }

        info!(issue_count = issues.len(), "synced issue cache");
        Ok(())
    }

    /// Returns the number of resident issues.
    pub async fn issue_count(&self) -> usize {
        self.issues.read().await.len()
    }
}

#[async_trait]
impl IssueStore for IssueCache {
    async fn create_alert(&self, alert: Alert) -> Result<Issue> {
        let mut issues = self.issues.write().await;

        if let Some(backing) = &self.backing {
            let issue = backing.create_alert(alert).await?;
            issues.insert(issue.id.clone(), issue.clone());
            return Ok(issue);
        }

        let mut alert = alert;
        alert.id = Uuid::new_v4().to_string();

        let mut issue = match active_room_issue(&issues, &alert.device.room.id) {
            Some(issue) => issue.clone(),
            None => {
                let issue = Issue {
                    id: Uuid::new_v4().to_string(),
                    room: alert.device.room.clone(),
                    start: alert.start,
                    ..Default::default()
                };

                info!(room_id = %issue.room.id, issue_id = %issue.id, "creating issue");
                issue
            }
        };

        info!(
            room_id = %alert.device.room.id,
            issue_id = %issue.id,
            alert_id = %alert.id,
            device_id = %alert.device.id,
            alert_type = %alert.alert_type,
            "creating alert"
        );

        alert.issue_id = issue.id.clone();
        issue.alerts.insert(alert.id.clone(), alert);
        issues.insert(issue.id.clone(), issue.clone());
        Ok(issue)
    }

    async fn close_alert(&self, issue_id: &str, alert_id: &str) -> Result<Issue> {
        let mut issues = self.issues.write().await;

        if let Some(backing) = &self.backing {
            let issue = backing.close_alert(issue_id, alert_id).await?;
            if issue.active() {
                issues.insert(issue.id.clone(), issue.clone());
            } else {
                issues.remove(&issue.id);
            }
            return Ok(issue);
        }

        let Some(issue) = issues.get_mut(issue_id) else {
            return Err(Error::IssueNotFound {
                id: issue_id.to_string(),
            });
        };
        let Some(alert) = issue.alerts.get_mut(alert_id) else {
            return Err(Error::AlertNotFound {
                issue_id: issue_id.to_string(),
                alert_id: alert_id.to_string(),
            });
        };

        info!(
            room_id = %issue.room.id,
            issue_id = %issue_id,
            alert_id = %alert_id,
            device_id = %alert.device.id,
            alert_type = %alert.alert_type,
            "closing alert"
        );

        alert.end = Some(Utc::now());

        // the issue lives exactly as long as one of its alerts is active
        if issue.has_active_alerts() {
            return Ok(issue.clone());
        }

        info!(room_id = %issue.room.id, issue_id = %issue_id, "closing issue");
        issue.end = Some(Utc::now());

        let closed = issue.clone();
        issues.remove(issue_id);
        Ok(closed)
    }

    async fn add_issue_events(&self, issue_id: &str, events: &[IssueEvent]) -> Result<()> {
        let mut issues = self.issues.write().await;

        if let Some(backing) = &self.backing {
            backing.add_issue_events(issue_id, events).await?;
        }

        let Some(issue) = issues.get_mut(issue_id) else {
            // the issue may already have been closed and evicted; the
            // backing (if any) has the events, so there is nothing left
            // to do here
            return Ok(());
        };

        issue.events.extend_from_slice(events);

        if let Some(incidents) = &self.incidents {
            for incident_id in issue.incidents.keys() {
                incidents
                    .add_issue_events(incident_id, events)
                    .await
                    .map_err(|e| Error::Store {
                        reason: format!("unable to add events to incident {incident_id}: {e}"),
                    })?;
            }
        }

        Ok(())
    }

    async fn link_incident(&self, issue_id: &str, incident: Incident) -> Result<Issue> {
        let mut issues = self.issues.write().await;

        if let Some(backing) = &self.backing {
            let issue = backing.link_incident(issue_id, incident).await?;
            issues.insert(issue.id.clone(), issue.clone());
            return Ok(issue);
        }

        let Some(issue) = issues.get_mut(issue_id) else {
            return Err(Error::IssueNotFound {
                id: issue_id.to_string(),
            });
        };

        info!(issue_id = %issue_id, incident_id = %incident.id, "linking incident");
        issue.incidents.insert(incident.id.clone(), incident);
        Ok(issue.clone())
    }

    async fn close_alerts_for_issue(&self, issue_id: &str) -> Result<Issue> {
        let mut issues = self.issues.write().await;

        if let Some(backing) = &self.backing {
            let issue = backing.close_alerts_for_issue(issue_id).await?;
            if issue.active() {
                issues.insert(issue.id.clone(), issue.clone());
            } else {
                issues.remove(&issue.id);
            }
            return Ok(issue);
        }

        let Some(issue) = issues.get_mut(issue_id) else {
            return Err(Error::IssueNotFound {
                id: issue_id.to_string(),
            });
        };

        info!(room_id = %issue.room.id, issue_id = %issue_id, "closing all alerts on issue");

        let now = Utc::now();
        for alert in issue.alerts.values_mut().filter(|a| a.active()) {
            alert.end = Some(now);
        }
        issue.end = Some(now);

        let closed = issue.clone();
        issues.remove(issue_id);
        Ok(closed)
    }

    async fn acknowledge_issue(&self, issue_id: &str, by: &str) -> Result<Issue> {
        let mut issues = self.issues.write().await;

        if let Some(backing) = &self.backing {
            let issue = backing.acknowledge_issue(issue_id, by).await?;
            issues.insert(issue.id.clone(), issue.clone());
            return Ok(issue);
        }

        let Some(issue) = issues.get_mut(issue_id) else {
            return Err(Error::IssueNotFound {
                id: issue_id.to_string(),
            });
        };

        info!(issue_id = %issue_id, by = %by, "acknowledging issue");
        issue.acknowledged_by = Some(by.to_string());
        issue.acknowledged_at = Some(Utc::now());
        Ok(issue.clone())
    }

    async fn unacknowledge_issue(&self, issue_id: &str) -> Result<Issue> {
        let mut issues = self.issues.write().await;

        if let Some(backing) = &self.backing {
            let issue = backing.unacknowledge_issue(issue_id).await?;
            issues.insert(issue.id.clone(), issue.clone());
            return Ok(issue);
        }

        let Some(issue) = issues.get_mut(issue_id) else {
            return Err(Error::IssueNotFound {
                id: issue_id.to_string(),
            });
        };

        issue.acknowledged_by = None;
        issue.acknowledged_at = None;
        Ok(issue.clone())
    }

    async fn set_issue_status(&self, issue_id: &str, status: &str) -> Result<Issue> {
        let mut issues = self.issues.write().await;

        if let Some(backing) = &self.backing {
            let issue = backing.set_issue_status(issue_id, status).await?;
            issues.insert(issue.id.clone(), issue.clone());
            return Ok(issue);
        }

        let Some(issue) = issues.get_mut(issue_id) else {
            return Err(Error::IssueNotFound {
                id: issue_id.to_string(),
            });
        };

        issue.status = Some(status.to_string());
        Ok(issue.clone())
    }

    // Read paths scan the resident set only: it is defined to be exactly
    // the active issues, so the backing is never consulted.

    async fn active_alert_exists(
        &self,
        room_id: &str,
        device_id: &str,
        alert_type: &str,
    ) -> Result<bool> {
        let issues = self.issues.read().await;

        let Some(issue) = active_room_issue(&issues, room_id) else {
            return Ok(false);
        };

        Ok(issue.alerts.values().any(|a| {
            a.active() && a.device.id == device_id && a.alert_type == alert_type
        }))
    }

    async fn active_alerts(&self) -> Result<Vec<Alert>> {
        let issues = self.issues.read().await;

        Ok(issues
            .values()
            .filter(|i| i.active())
            .flat_map(|i| i.alerts.values())
            .filter(|a| a.active())
            .cloned()
            .collect())
    }

    async fn active_alerts_by_type(&self, alert_type: &str) -> Result<Vec<Alert>> {
        let issues = self.issues.read().await;

        Ok(issues
            .values()
            .filter(|i| i.active())
            .flat_map(|i| i.alerts.values())
            .filter(|a| a.active() && a.alert_type == alert_type)
            .cloned()
            .collect())
    }

    async fn active_issue(&self, room_id: &str) -> Result<Issue> {
        let issues = self.issues.read().await;

        active_room_issue(&issues, room_id)
            .cloned()
            .ok_or_else(|| Error::RoomIssueNotFound {
                room_id: room_id.to_string(),
            })
    }

    async fn active_issues(&self) -> Result<Vec<Issue>> {
        let issues = self.issues.read().await;
        Ok(issues.values().filter(|i| i.active()).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use smee_core::types::{DeviceRef, Room};

    fn alert(room_id: &str, device_id: &str, alert_type: &str) -> Alert {
        Alert {
            device: DeviceRef::new(room_id, device_id),
            alert_type: alert_type.to_string(),
            start: Utc::now(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_makes_issue_when_room_has_none() {
        let store = IssueCache::new();

        let issue = store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();

        assert!(issue.active());
        assert_eq!(issue.room.id, "ITB-1101");
        assert_eq!(issue.alerts.len(), 1);
        assert!(!issue.id.is_empty());

        let alert = issue.alerts.values().next().unwrap();
        assert!(alert.active());
        assert_eq!(alert.issue_id, issue.id);
    }

    #[tokio::test]
    async fn create_binds_to_existing_room_issue() {
        let store = IssueCache::new();

        let first = store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();
        let second = store
            .create_alert(alert("ITB-1101", "D2", "device-offline"))
            .await
            .unwrap();

        // one issue per room, both alerts on it
        assert_eq!(first.id, second.id);
        assert_eq!(second.alerts.len(), 2);
        assert_eq!(store.issue_count().await, 1);
    }

    #[tokio::test]
    async fn create_separates_rooms() {
        let store = IssueCache::new();

        let a = store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();
        let b = store
            .create_alert(alert("ITB-1102", "D1", "device-comm"))
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(store.issue_count().await, 2);
    }

    #[tokio::test]
    async fn close_last_alert_closes_and_evicts_issue() {
        let store = IssueCache::new();

        let issue = store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();
        let alert_id = issue.alerts.keys().next().unwrap().clone();

        let closed = store.close_alert(&issue.id, &alert_id).await.unwrap();
        assert!(!closed.active());
        assert!(!closed.has_active_alerts());

        // evicted from the resident set
        assert_eq!(store.issue_count().await, 0);
        assert!(store.active_issue("ITB-1101").await.is_err());
    }

    #[tokio::test]
    async fn close_keeps_issue_with_remaining_alerts() {
        let store = IssueCache::new();

        store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();
        let issue = store
            .create_alert(alert("ITB-1101", "D2", "device-offline"))
            .await
            .unwrap();

        let (close_id, _) = issue
            .alerts
            .iter()
            .find(|(_, a)| a.device.id == "D1")
            .map(|(id, a)| (id.clone(), a.clone()))
            .unwrap();

        let still_open = store.close_alert(&issue.id, &close_id).await.unwrap();
        assert!(still_open.active());
        assert!(still_open.has_active_alerts());
        assert_eq!(store.issue_count().await, 1);
    }

    #[tokio::test]
    async fn close_unknown_issue_is_not_found() {
        let store = IssueCache::new();

        let err = store.close_alert("nope", "nope").await;
        assert!(matches!(err, Err(Error::IssueNotFound { .. })));

        let issue = store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();
        let err = store.close_alert(&issue.id, "nope").await;
        assert!(matches!(err, Err(Error::AlertNotFound { .. })));
    }

    #[tokio::test]
    async fn active_alert_exists_matches_identity() {
        let store = IssueCache::new();

        store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();

        assert!(
            store
                .active_alert_exists("ITB-1101", "D1", "device-comm")
                .await
                .unwrap()
        );
        assert!(
            !store
                .active_alert_exists("ITB-1101", "D1", "device-offline")
                .await
                .unwrap()
        );
        assert!(
            !store
                .active_alert_exists("ITB-1101", "D2", "device-comm")
                .await
                .unwrap()
        );
        assert!(
            !store
                .active_alert_exists("ITB-1102", "D1", "device-comm")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn active_alerts_by_type_filters() {
        let store = IssueCache::new();

        store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();
        store
            .create_alert(alert("ITB-1102", "D2", "device-comm"))
            .await
            .unwrap();
        store
            .create_alert(alert("ITB-1103", "D3", "receiver"))
            .await
            .unwrap();

        assert_eq!(store.active_alerts().await.unwrap().len(), 3);
        assert_eq!(
            store.active_alerts_by_type("device-comm").await.unwrap().len(),
            2
        );
        assert_eq!(store.active_alerts_by_type("receiver").await.unwrap().len(), 1);
        assert!(store.active_alerts_by_type("nope").await.unwrap().is_empty());
    }

    struct RecordingIncidentStore {
        received: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl IncidentStore for RecordingIncidentStore {
        async fn add_issue_events(&self, incident_id: &str, events: &[IssueEvent]) -> Result<()> {
            if let Ok(mut received) = self.received.lock() {
                received.push((incident_id.to_string(), events.len()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_append_and_propagate_to_incidents() {
        let incidents = Arc::new(RecordingIncidentStore {
            received: Mutex::new(Vec::new()),
        });
        let store = IssueCache::new().with_incident_store(Arc::clone(&incidents) as Arc<dyn IncidentStore>);

        let issue = store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();

        store
            .link_incident(
                &issue.id,
                Incident {
                    id: "inc-1".to_string(),
                    name: "INC0010001".to_string(),
                    caller: "operator".to_string(),
                    short_description: "projector down".to_string(),
                },
            )
            .await
            .unwrap();

        let events = vec![IssueEvent::system_message("narration")];
        store.add_issue_events(&issue.id, &events).await.unwrap();

        let updated = store.active_issue("ITB-1101").await.unwrap();
        assert_eq!(updated.events.len(), 1);
        assert_eq!(updated.incidents.len(), 1);

        let received = incidents.received.lock().unwrap();
        assert_eq!(received.as_slice(), &[("inc-1".to_string(), 1)]);
    }

    #[tokio::test]
    async fn events_for_evicted_issue_are_dropped_quietly() {
        let store = IssueCache::new();

        let events = vec![IssueEvent::system_message("late narration")];
        assert!(store.add_issue_events("gone", &events).await.is_ok());
    }

    #[tokio::test]
    async fn close_alerts_for_issue_closes_everything() {
        let store = IssueCache::new();

        store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();
        let issue = store
            .create_alert(alert("ITB-1101", "D2", "device-offline"))
            .await
            .unwrap();

        let closed = store.close_alerts_for_issue(&issue.id).await.unwrap();
        assert!(!closed.active());
        assert!(closed.alerts.values().all(|a| !a.active()));
        assert_eq!(store.issue_count().await, 0);
    }

    #[tokio::test]
    async fn acknowledge_and_status() {
        let store = IssueCache::new();

        let issue = store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();

        let acked = store.acknowledge_issue(&issue.id, "avtech").await.unwrap();
        assert_eq!(acked.acknowledged_by.as_deref(), Some("avtech"));
        assert!(acked.acknowledged_at.is_some());

        let status = store.set_issue_status(&issue.id, "in-progress").await.unwrap();
        assert_eq!(status.status.as_deref(), Some("in-progress"));

        let cleared = store.unacknowledge_issue(&issue.id).await.unwrap();
        assert!(cleared.acknowledged_by.is_none());
        assert!(cleared.acknowledged_at.is_none());
    }

    /// Minimal backing store: answers `active_issues` for sync and
    /// records which mutations were delegated.
    struct RecordingBacking {
        seeded: Vec<Issue>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl IssueStore for RecordingBacking {
        async fn create_alert(&self, mut alert: Alert) -> Result<Issue> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push("create_alert".to_string());
            }
            alert.id = "backing-alert".to_string();
            alert.issue_id = "backing-issue".to_string();
            let mut issue = Issue {
                id: "backing-issue".to_string(),
                room: alert.device.room.clone(),
                start: alert.start,
                ..Default::default()
            };
            issue.alerts.insert(alert.id.clone(), alert);
            Ok(issue)
        }

        async fn close_alert(&self, issue_id: &str, _alert_id: &str) -> Result<Issue> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push("close_alert".to_string());
            }
            Ok(Issue {
                id: issue_id.to_string(),
                room: Room::new("ITB-1101"),
                start: Utc::now(),
                end: Some(Utc::now()),
                ..Default::default()
            })
        }

        async fn add_issue_events(&self, _issue_id: &str, _events: &[IssueEvent]) -> Result<()> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push("add_issue_events".to_string());
            }
            Ok(())
        }

        async fn link_incident(&self, issue_id: &str, incident: Incident) -> Result<Issue> {
            let mut issue = Issue {
                id: issue_id.to_string(),
                room: Room::new("ITB-1101"),
                start: Utc::now(),
                ..Default::default()
            };
            issue.incidents.insert(incident.id.clone(), incident);
            Ok(issue)
        }

        async fn close_alerts_for_issue(&self, issue_id: &str) -> Result<Issue> {
            Ok(Issue {
                id: issue_id.to_string(),
                room: Room::new("ITB-1101"),
                start: Utc::now(),
                end: Some(Utc::now()),
                ..Default::default()
            })
        }

        async fn acknowledge_issue(&self, issue_id: &str, by: &str) -> Result<Issue> {
            Ok(Issue {
                id: issue_id.to_string(),
                room: Room::new("ITB-1101"),
                start: Utc::now(),
                acknowledged_by: Some(by.to_string()),
                acknowledged_at: Some(Utc::now()),
                ..Default::default()
            })
        }

        async fn unacknowledge_issue(&self, issue_id: &str) -> Result<Issue> {
            Ok(Issue {
                id: issue_id.to_string(),
                room: Room::new("ITB-1101"),
                start: Utc::now(),
                ..Default::default()
            })
        }

        async fn set_issue_status(&self, issue_id: &str, status: &str) -> Result<Issue> {
            Ok(Issue {
                id: issue_id.to_string(),
                room: Room::new("ITB-1101"),
                start: Utc::now(),
                status: Some(status.to_string()),
                ..Default::default()
            })
        }

        async fn active_alert_exists(
            &self,
            _room_id: &str,
            _device_id: &str,
            _alert_type: &str,
        ) -> Result<bool> {
            Ok(false)
        }

        async fn active_alerts(&self) -> Result<Vec<Alert>> {
            Ok(Vec::new())
        }

        async fn active_alerts_by_type(&self, _alert_type: &str) -> Result<Vec<Alert>> {
            Ok(Vec::new())
        }

        async fn active_issue(&self, room_id: &str) -> Result<Issue> {
            Err(Error::RoomIssueNotFound {
                room_id: room_id.to_string(),
            })
        }

        async fn active_issues(&self) -> Result<Vec<Issue>> {
            Ok(self.seeded.clone())
        }
    }

    #[tokio::test]
    async fn sync_loads_active_issues_from_backing() {
        let seeded = Issue {
            id: "seeded".to_string(),
            room: Room::new("ITB-1101"),
            start: Utc::now(),
            ..Default::default()
        };
        let backing = Arc::new(RecordingBacking {
            seeded: vec![seeded],
            calls: Mutex::new(Vec::new()),
        });
        let store = IssueCache::new().with_backing(backing as Arc<dyn IssueStore>);

        store.sync().await.unwrap();
        assert_eq!(store.issue_count().await, 1);

        let issue = store.active_issue("ITB-1101").await.unwrap();
        assert_eq!(issue.id, "seeded");
    }

    #[tokio::test]
    async fn mutations_delegate_to_backing() {
        let backing = Arc::new(RecordingBacking {
            seeded: Vec::new(),
            calls: Mutex::new(Vec::new()),
        });
        let store =
            IssueCache::new().with_backing(Arc::clone(&backing) as Arc<dyn IssueStore>);

        let issue = store
            .create_alert(alert("ITB-1101", "D1", "device-comm"))
            .await
            .unwrap();
        assert_eq!(issue.id, "backing-issue");
        assert_eq!(store.issue_count().await, 1);

        // closed issue gets evicted on the way back
        store.close_alert(&issue.id, "backing-alert").await.unwrap();
        assert_eq!(store.issue_count().await, 0);

        let calls = backing.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            &["create_alert".to_string(), "close_alert".to_string()]
        );
    }
}
