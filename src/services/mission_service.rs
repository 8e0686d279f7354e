// src/services/mission_service.rs
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing;

use crate::{
    errors::{FleetError, FleetResult, ValidationError},
    models::{
        duplicate_ids, EndMissionRequest, FleetData, Mission, MissionFilter, StartMissionRequest,
    },
    services::{
        export_service::{spawn_export, MissionExporter},
        store_service::FleetStore,
    },
};

/// The active mission with the names the dashboard shows next to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveMissionView {
    #[serde(flatten)]
    pub mission: Mission,
    pub vehicle_plate: Option<String>,
    pub driver_name: Option<String>,
}

#[async_trait]
pub trait MissionOperations: Send + Sync {
    async fn start_mission(&self, request: StartMissionRequest) -> FleetResult<Mission>;
    async fn end_mission(&self, mission_id: &str, request: EndMissionRequest) -> FleetResult<Mission>;
    async fn list_missions(&self, filter: MissionFilter) -> FleetResult<Vec<Mission>>;
    async fn active_mission(&self) -> FleetResult<Option<ActiveMissionView>>;
    async fn replace_missions(&self, missions: Vec<Mission>, expected_revision: Option<u64>) -> FleetResult<u64>;
    async fn save_script_url(&self, url: &str, expected_revision: Option<u64>) -> FleetResult<u64>;
}

pub struct MissionService {
    store: Arc<dyn FleetStore>,
    exporter: Arc<dyn MissionExporter>,
}

impl MissionService {
    pub fn new(store: Arc<dyn FleetStore>, exporter: Arc<dyn MissionExporter>) -> Self {
        Self { store, exporter }
    }

    pub fn exports_enabled(&self) -> bool {
        self.exporter.is_enabled()
    }

    fn dispatch_export(&self, mission: &Mission, data: &FleetData) {
        if data.script_url.is_empty() || !self.exports_enabled() {
            return;
        }
        match (data.vehicle(&mission.vehicle_id), data.driver(&mission.driver_id)) {
            (Some(vehicle), Some(driver)) => {
                spawn_export(
                    self.exporter.clone(),
                    mission.clone(),
                    vehicle.clone(),
                    driver.clone(),
                    data.script_url.clone(),
                );
            }
            _ => tracing::warn!("Mission {} not exported: vehicle or driver no longer exists", mission.id),
        }
    }
}

/// Empty disables the export; anything else must be an absolute http(s) URL.
pub fn validate_script_url(url: &str) -> FleetResult<String> {
    let url = url.trim();
    if url.is_empty() {
        return Ok(String::new());
    }
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(url.to_string()),
        Ok(parsed) => Err(FleetError::InvalidUrl(format!("unsupported scheme: {}", parsed.scheme()))),
        Err(e) => Err(FleetError::InvalidUrl(format!("{}: {}", url, e))),
    }
}

#[async_trait]
impl MissionOperations for MissionService {
    async fn start_mission(&self, request: StartMissionRequest) -> FleetResult<Mission> {
        let data = self.store.load().await?;
        let transition = data.start_mission(&request, Utc::now())?;
        self.store.commit(transition.changes, data.revision).await?;

        tracing::info!(
            "Mission {} started: vehicle {} driver {} at {} km",
            transition.mission.id,
            transition.mission.vehicle_id,
            transition.mission.driver_id,
            transition.mission.start_km
        );
        Ok(transition.mission)
    }

    async fn end_mission(&self, mission_id: &str, request: EndMissionRequest) -> FleetResult<Mission> {
        let data = self.store.load().await?;
        let transition = data.end_mission(mission_id, &request, Utc::now())?;
        let committed = self.store.commit(transition.changes, data.revision).await?;

        tracing::info!(
            "Mission {} completed at {} km",
            transition.mission.id,
            transition.mission.end_km.unwrap_or_default()
        );
        self.dispatch_export(&transition.mission, &committed);
        Ok(transition.mission)
    }

    async fn list_missions(&self, filter: MissionFilter) -> FleetResult<Vec<Mission>> {
        let data = self.store.load().await?;
        let mut missions: Vec<Mission> = data
            .missions
            .into_iter()
            .filter(|m| filter.status.is_none_or(|status| m.status == status))
            .collect();
        missions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(missions)
    }

    async fn active_mission(&self) -> FleetResult<Option<ActiveMissionView>> {
        let data = self.store.load().await?;
        Ok(data.active_mission().map(|mission| ActiveMissionView {
            mission: mission.clone(),
            vehicle_plate: data.vehicle(&mission.vehicle_id).map(|v| v.plate.clone()),
            driver_name: data.driver(&mission.driver_id).map(|d| d.name.clone()),
        }))
    }

    async fn replace_missions(&self, missions: Vec<Mission>, expected_revision: Option<u64>) -> FleetResult<u64> {
        let mut errors: Vec<ValidationError> = missions.iter().flat_map(Mission::validate_record).collect();
        errors.extend(duplicate_ids("missions", missions.iter().map(|m| m.id.as_str())));
        if missions.iter().filter(|m| m.is_in_progress()).count() > 1 {
            errors.push(ValidationError::new("missions", "At most one mission can be in progress"));
        }
        FleetError::check(errors)?;

        let expected = match expected_revision {
            Some(revision) => revision,
            None => self.store.load().await?.revision,
        };
        let count = missions.len();
        let revision = self.store.save_missions(missions, expected).await?;

        tracing::info!("Mission log replaced with {} missions (revision {})", count, revision);
        Ok(revision)
    }

    async fn save_script_url(&self, url: &str, expected_revision: Option<u64>) -> FleetResult<u64> {
        let url = validate_script_url(url)?;
        let expected = match expected_revision {
            Some(revision) => revision,
            None => self.store.load().await?.revision,
        };
        let enabled = !url.is_empty();
        let revision = self.store.save_script_url(url, expected).await?;

        if enabled {
            tracing::info!("Export webhook configured (revision {})", revision);
        } else {
            tracing::info!("Export webhook disabled (revision {})", revision);
        }
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Driver, FleetChanges, MissionStatus, Vehicle};
    use crate::services::export_service::DisabledExporter;
    use crate::services::store_service::MemoryStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct RecordingExporter {
        sent: mpsc::UnboundedSender<(String, String, String)>,
    }

    #[async_trait]
    impl MissionExporter for RecordingExporter {
        async fn export(&self, mission: &Mission, vehicle: &Vehicle, _: &Driver, url: &str) -> FleetResult<()> {
            let _ = self.sent.send((mission.id.clone(), vehicle.plate.clone(), url.to_string()));
            Ok(())
        }
    }

    fn start_request(vehicle_id: &str, start_km: u64) -> StartMissionRequest {
        StartMissionRequest {
            vehicle_id: vehicle_id.to_string(),
            driver_id: "1".to_string(),
            destination: "Centro operativo".to_string(),
            reason: "Sopralluogo".to_string(),
            start_km,
        }
    }

    fn end_request(end_km: u64) -> EndMissionRequest {
        EndMissionRequest { end_km: Some(end_km), ..Default::default() }
    }

    fn service() -> (MissionService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::seeded());
        (MissionService::new(store.clone(), Arc::new(DisabledExporter)), store)
    }

    #[tokio::test]
    async fn test_start_and_end_update_odometer() {
        let (missions, store) = service();

        let started = missions.start_mission(start_request("1", 12500)).await.unwrap();
        let active = missions.active_mission().await.unwrap().unwrap();
        assert_eq!(active.mission.id, started.id);
        assert_eq!(active.vehicle_plate.as_deref(), Some("PC 123 AA"));
        assert_eq!(active.driver_name.as_deref(), Some("Mario Rossi"));

        let before = store.load().await.unwrap();
        let err = missions.end_mission(&started.id, end_request(12400)).await.unwrap_err();
        assert!(err.is_validation());
        let after = store.load().await.unwrap();
        assert_eq!(after.vehicle("1").unwrap().last_km, 12500);
        let still_open = after.mission(&started.id).unwrap();
        assert_eq!(still_open.status, MissionStatus::InProgress);
        assert_eq!(still_open.end_km, None);
        assert_eq!(after.active_mission_id.as_deref(), Some(started.id.as_str()));
        assert_eq!(after.revision, before.revision);
        assert_eq!(after.missions.len(), before.missions.len());

        let ended = missions.end_mission(&started.id, end_request(12600)).await.unwrap();
        assert_eq!(ended.status, MissionStatus::Completed);

        let data = store.load().await.unwrap();
        assert_eq!(data.vehicle("1").unwrap().last_km, 12600);
        assert_eq!(data.active_mission_id, None);
        assert!(missions.active_mission().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_validation_persists_nothing() {
        let (missions, store) = service();
        let mut request = start_request("1", 0);
        request.reason = String::new();

        let err = missions.start_mission(request).await.unwrap_err();
        assert_eq!(err.validation_fields(), vec!["reason", "startKm"]);

        let data = store.load().await.unwrap();
        assert!(data.missions.is_empty());
        assert_eq!(data.revision, 0);
    }

    #[tokio::test]
    async fn test_second_start_conflicts() {
        let (missions, _) = service();
        missions.start_mission(start_request("1", 12500)).await.unwrap();
        let err = missions.start_mission(start_request("2", 45000)).await.unwrap_err();
        assert!(matches!(err, FleetError::MissionAlreadyActive(_)));
    }

    #[tokio::test]
    async fn test_ending_twice_conflicts() {
        let (missions, _) = service();
        let started = missions.start_mission(start_request("1", 12500)).await.unwrap();
        missions.end_mission(&started.id, end_request(12550)).await.unwrap();
        let err = missions.end_mission(&started.id, end_request(12560)).await.unwrap_err();
        assert!(matches!(err, FleetError::MissionAlreadyCompleted(_)));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_filterable() {
        let (missions, _) = service();
        let first = missions.start_mission(start_request("1", 12500)).await.unwrap();
        missions.end_mission(&first.id, end_request(12510)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = missions.start_mission(start_request("2", 45000)).await.unwrap();

        let all = missions.list_missions(MissionFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec![second.id.as_str(), first.id.as_str()]);

        let completed = missions
            .list_missions(MissionFilter { status: Some(MissionStatus::Completed) })
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, first.id);
    }

    #[tokio::test]
    async fn test_end_exports_when_script_url_is_set() {
        let store = Arc::new(MemoryStore::seeded());
        store
            .commit(FleetChanges::script_url("https://example.org/exec".to_string()), 0)
            .await
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let missions = MissionService::new(store, Arc::new(RecordingExporter { sent: tx }));

        let started = missions.start_mission(start_request("2", 45000)).await.unwrap();
        missions.end_mission(&started.id, end_request(45120)).await.unwrap();

        let (id, plate, url) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id, started.id);
        assert_eq!(plate, "PC 456 BB");
        assert_eq!(url, "https://example.org/exec");
    }

    #[tokio::test]
    async fn test_no_export_without_script_url() {
        let store = Arc::new(MemoryStore::seeded());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let missions = MissionService::new(store, Arc::new(RecordingExporter { sent: tx }));

        let started = missions.start_mission(start_request("1", 12500)).await.unwrap();
        missions.end_mission(&started.id, end_request(12501)).await.unwrap();
        drop(missions);

        // the exporter (and its sender) is gone without sending anything
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_replace_missions() {
        let (missions, store) = service();
        let started = missions.start_mission(start_request("1", 12500)).await.unwrap();
        let revision = store.load().await.unwrap().revision;

        let mut duplicate = started.clone();
        duplicate.status = MissionStatus::Completed;
        duplicate.end_km = Some(12400);
        let err = missions
            .replace_missions(vec![started.clone(), duplicate], None)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = missions.replace_missions(vec![], Some(revision + 5)).await.unwrap_err();
        assert!(matches!(err, FleetError::StaleRevision { .. }));

        let new_revision = missions.replace_missions(vec![], Some(revision)).await.unwrap();
        assert_eq!(new_revision, revision + 1);
        assert_eq!(store.load().await.unwrap().active_mission_id, None);
    }

    #[test]
    fn test_script_url_validation() {
        assert_eq!(validate_script_url("  ").unwrap(), "");
        assert_eq!(
            validate_script_url(" https://script.google.com/macros/s/abc/exec ").unwrap(),
            "https://script.google.com/macros/s/abc/exec"
        );
        assert!(matches!(validate_script_url("ftp://host/file"), Err(FleetError::InvalidUrl(_))));
        assert!(matches!(validate_script_url("not a url"), Err(FleetError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_save_script_url() {
        let (missions, store) = service();
        let revision = missions.save_script_url("https://example.org/exec", None).await.unwrap();
        assert_eq!(revision, 1);
        assert_eq!(store.load().await.unwrap().script_url, "https://example.org/exec");

        missions.save_script_url("", Some(1)).await.unwrap();
        assert_eq!(store.load().await.unwrap().script_url, "");
    }
}
