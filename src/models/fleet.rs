// src/models/fleet.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::{FleetError, FleetResult, ValidationError};
use crate::models::driver::{Driver, DriverResponse};
use crate::models::mission::{EndMissionRequest, Mission, StartMissionRequest};
use crate::models::vehicle::{MaintenanceStatus, Vehicle, VehicleType};

/// Everything the service persists, in the layout of `data.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FleetData {
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
    #[serde(default)]
    pub missions: Vec<Mission>,
    #[serde(default)]
    pub script_url: String,
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub active_mission_id: Option<String>,
}

/// Collections replaced by one atomic commit. `None` leaves a collection as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetChanges {
    pub vehicles: Option<Vec<Vehicle>>,
    pub drivers: Option<Vec<Driver>>,
    pub missions: Option<Vec<Mission>>,
    pub script_url: Option<String>,
    pub active_mission_id: Option<Option<String>>,
}

/// Outcome of a lifecycle step: the mission as it now stands and what to commit.
#[derive(Debug, Clone)]
pub struct MissionTransition {
    pub mission: Mission,
    pub changes: FleetChanges,
}

/// Public view of the fleet; drivers are stripped of their PINs.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshot {
    pub vehicles: Vec<Vehicle>,
    pub drivers: Vec<DriverResponse>,
    pub missions: Vec<Mission>,
    pub script_url: String,
    pub revision: u64,
    pub active_mission_id: Option<String>,
}

impl FleetChanges {
    pub fn vehicles(vehicles: Vec<Vehicle>) -> Self {
        Self { vehicles: Some(vehicles), ..Default::default() }
    }

    pub fn drivers(drivers: Vec<Driver>) -> Self {
        Self { drivers: Some(drivers), ..Default::default() }
    }

    pub fn missions(missions: Vec<Mission>, active_mission_id: Option<String>) -> Self {
        Self {
            missions: Some(missions),
            active_mission_id: Some(active_mission_id),
            ..Default::default()
        }
    }

    pub fn script_url(url: String) -> Self {
        Self { script_url: Some(url), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_none()
            && self.drivers.is_none()
            && self.missions.is_none()
            && self.script_url.is_none()
            && self.active_mission_id.is_none()
    }

    /// Applies the changes and bumps the revision.
    pub fn apply_to(self, data: &mut FleetData) {
        if let Some(vehicles) = self.vehicles {
            data.vehicles = vehicles;
        }
        if let Some(drivers) = self.drivers {
            data.drivers = drivers;
        }
        if let Some(missions) = self.missions {
            data.missions = missions;
        }
        if let Some(url) = self.script_url {
            data.script_url = url;
        }
        if let Some(active) = self.active_mission_id {
            data.active_mission_id = active;
        }
        data.revision += 1;
    }
}

impl FleetData {
    /// Initial content of a fresh store.
    pub fn seed() -> Self {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d);
        Self {
            vehicles: vec![
                Vehicle {
                    id: "1".to_string(),
                    plate: "PC 123 AA".to_string(),
                    model: "Land Rover Defender".to_string(),
                    vehicle_type: VehicleType::Firefighting,
                    insurance_expiry: date(2024, 12, 31),
                    revision_expiry: date(2024, 6, 15),
                    stamp_expiry: date(2025, 1, 20),
                    maintenance_status: MaintenanceStatus::Ok,
                    last_km: 12500,
                },
                Vehicle {
                    id: "2".to_string(),
                    plate: "PC 456 BB".to_string(),
                    model: "Fiat Ducato".to_string(),
                    vehicle_type: VehicleType::Ambulance,
                    insurance_expiry: date(2023, 11, 30),
                    revision_expiry: date(2025, 2, 10),
                    stamp_expiry: date(2024, 5, 15),
                    maintenance_status: MaintenanceStatus::Requested,
                    last_km: 45000,
                },
            ],
            drivers: vec![
                Driver {
                    id: "1".to_string(),
                    name: "Mario Rossi".to_string(),
                    license: "B, C".to_string(),
                    is_admin: true,
                    pin: "1234".to_string(),
                },
                Driver {
                    id: "2".to_string(),
                    name: "Luigi Bianchi".to_string(),
                    license: "B".to_string(),
                    is_admin: false,
                    pin: "0000".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    /// Repairs the active-mission reference after loading data written without it.
    pub fn normalize(&mut self) {
        let in_progress: Vec<&Mission> = self.missions.iter().filter(|m| m.is_in_progress()).collect();

        let stored_is_valid = self
            .active_mission_id
            .as_deref()
            .is_some_and(|id| in_progress.iter().any(|m| m.id == id));
        if stored_is_valid {
            return;
        }

        if in_progress.len() > 1 {
            tracing::warn!(
                "{} missions are in progress at once, treating {} as active",
                in_progress.len(),
                in_progress[0].id
            );
        }
        let derived = in_progress.first().map(|m| m.id.clone());
        if self.active_mission_id.is_some() && derived != self.active_mission_id {
            tracing::warn!("Stored active mission {:?} is not in progress, using {:?}", self.active_mission_id, derived);
        }
        self.active_mission_id = derived;
    }

    pub fn vehicle(&self, id: &str) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn driver(&self, id: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id == id)
    }

    pub fn mission(&self, id: &str) -> Option<&Mission> {
        self.missions.iter().find(|m| m.id == id)
    }

    pub fn active_mission(&self) -> Option<&Mission> {
        self.active_mission_id.as_deref().and_then(|id| self.mission(id))
    }

    /// Validates a start request against this snapshot and prepares the commit.
    pub fn start_mission(&self, request: &StartMissionRequest, now: DateTime<Utc>) -> FleetResult<MissionTransition> {
        if let Some(active) = self.active_mission() {
            return Err(FleetError::MissionAlreadyActive(active.id.clone()));
        }

        let mut errors = request.validate();
        let vehicle_id = request.vehicle_id.trim();
        let driver_id = request.driver_id.trim();
        if !vehicle_id.is_empty() && self.vehicle(vehicle_id).is_none() {
            errors.push(ValidationError::new("vehicleId", format!("Unknown vehicle: {}", vehicle_id)));
        }
        if !driver_id.is_empty() && self.driver(driver_id).is_none() {
            errors.push(ValidationError::new("driverId", format!("Unknown driver: {}", driver_id)));
        }
        FleetError::check(errors)?;

        if let Some(vehicle) = self.vehicle(vehicle_id) {
            if request.start_km < vehicle.last_km {
                tracing::warn!(
                    "Mission on {} starts at {} km, below the recorded {} km",
                    vehicle.plate,
                    request.start_km,
                    vehicle.last_km
                );
            }
        }

        let mission = Mission::start(request, now);
        let mut missions = self.missions.clone();
        missions.push(mission.clone());

        Ok(MissionTransition {
            changes: FleetChanges::missions(missions, Some(mission.id.clone())),
            mission,
        })
    }

    /// Completes a mission and moves its vehicle's odometer to the final reading.
    pub fn end_mission(
        &self,
        mission_id: &str,
        request: &EndMissionRequest,
        now: DateTime<Utc>,
    ) -> FleetResult<MissionTransition> {
        let current = self
            .mission(mission_id)
            .ok_or_else(|| FleetError::mission_not_found(mission_id))?;
        let completed = current.complete(request, now)?;

        let missions = self
            .missions
            .iter()
            .map(|m| if m.id == completed.id { completed.clone() } else { m.clone() })
            .collect();

        let still_active = self.active_mission_id.clone().filter(|id| *id != completed.id);
        let mut changes = FleetChanges::missions(missions, still_active);
        match completed.end_km {
            Some(end_km) if self.vehicle(&completed.vehicle_id).is_some() => {
                let vehicles = self
                    .vehicles
                    .iter()
                    .map(|v| {
                        if v.id == completed.vehicle_id {
                            Vehicle { last_km: end_km, ..v.clone() }
                        } else {
                            v.clone()
                        }
                    })
                    .collect();
                changes.vehicles = Some(vehicles);
            }
            _ => tracing::warn!(
                "Vehicle {} of mission {} no longer exists, odometer not updated",
                completed.vehicle_id,
                completed.id
            ),
        }

        Ok(MissionTransition { mission: completed, changes })
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            vehicles: self.vehicles.clone(),
            drivers: self.drivers.iter().map(Driver::to_response).collect(),
            missions: self.missions.clone(),
            script_url: self.script_url.clone(),
            revision: self.revision,
            active_mission_id: self.active_mission_id.clone(),
        }
    }
}

/// Rejects duplicate ids inside one collection.
pub fn duplicate_ids<'a>(collection: &str, ids: impl Iterator<Item = &'a str>) -> Vec<ValidationError> {
    let mut seen = HashSet::new();
    let mut errors = Vec::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(ValidationError::new(format!("{}[].id", collection), format!("Duplicate id: {}", id)));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mission::MissionStatus;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 4, 8, 30, 0).unwrap()
    }

    fn start_request(start_km: u64) -> StartMissionRequest {
        StartMissionRequest {
            vehicle_id: "1".to_string(),
            driver_id: "2".to_string(),
            destination: "Sede Provinciale".to_string(),
            reason: "Esercitazione".to_string(),
            start_km,
        }
    }

    fn committed(mut data: FleetData, changes: FleetChanges) -> FleetData {
        changes.apply_to(&mut data);
        data
    }

    #[test]
    fn test_odometer_scenario() {
        let fleet = FleetData::seed();
        assert_eq!(fleet.vehicle("1").unwrap().last_km, 12500);

        let started = fleet.start_mission(&start_request(12500), now()).unwrap();
        assert_eq!(started.mission.status, MissionStatus::InProgress);
        assert_eq!(started.mission.start_km, 12500);
        assert!(started.changes.vehicles.is_none());

        let fleet = committed(fleet, started.changes);
        assert_eq!(fleet.active_mission_id.as_deref(), Some(started.mission.id.as_str()));
        assert_eq!(fleet.revision, 1);

        let rejected = fleet.end_mission(
            &started.mission.id,
            &EndMissionRequest { end_km: Some(12400), ..Default::default() },
            now(),
        );
        assert!(rejected.unwrap_err().is_validation());
        assert_eq!(fleet.vehicle("1").unwrap().last_km, 12500);
        let still_open = fleet.mission(&started.mission.id).unwrap();
        assert_eq!(still_open.status, MissionStatus::InProgress);
        assert_eq!(still_open.end_km, None);
        assert_eq!(fleet.active_mission_id.as_deref(), Some(started.mission.id.as_str()));
        assert_eq!(fleet.revision, 1);

        let ended = fleet
            .end_mission(
                &started.mission.id,
                &EndMissionRequest { end_km: Some(12600), ..Default::default() },
                now(),
            )
            .unwrap();
        assert_eq!(ended.mission.status, MissionStatus::Completed);
        assert_eq!(ended.mission.end_km, Some(12600));

        let fleet = committed(fleet, ended.changes);
        assert_eq!(fleet.vehicle("1").unwrap().last_km, 12600);
        assert_eq!(fleet.vehicle("2").unwrap().last_km, 45000);
        assert_eq!(fleet.active_mission_id, None);
        assert_eq!(fleet.missions.len(), 1);
        assert_eq!(fleet.revision, 2);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let fleet = FleetData::seed();
        let first = fleet.start_mission(&start_request(12500), now()).unwrap();
        let fleet = committed(fleet, first.changes);

        let mut other = start_request(45000);
        other.vehicle_id = "2".to_string();
        match fleet.start_mission(&other, now()) {
            Err(FleetError::MissionAlreadyActive(id)) => assert_eq!(id, first.mission.id),
            other => panic!("expected MissionAlreadyActive, got {:?}", other),
        }
    }

    #[test]
    fn test_start_rejects_unknown_references() {
        let fleet = FleetData::seed();
        let mut request = start_request(10);
        request.vehicle_id = "99".to_string();
        request.driver_id = "42".to_string();
        let err = fleet.start_mission(&request, now()).unwrap_err();
        assert_eq!(err.validation_fields(), vec!["vehicleId", "driverId"]);
    }

    #[test]
    fn test_end_unknown_mission() {
        let fleet = FleetData::seed();
        let err = fleet
            .end_mission("nope", &EndMissionRequest { end_km: Some(1), ..Default::default() }, now())
            .unwrap_err();
        assert!(matches!(err, FleetError::MissionNotFound(_)));
    }

    #[test]
    fn test_end_with_deleted_vehicle_still_completes() {
        let fleet = FleetData::seed();
        let started = fleet.start_mission(&start_request(12500), now()).unwrap();
        let mut fleet = committed(fleet, started.changes);
        fleet.vehicles.retain(|v| v.id != "1");

        let ended = fleet
            .end_mission(&started.mission.id, &EndMissionRequest { end_km: Some(12510), ..Default::default() }, now())
            .unwrap();
        assert!(ended.changes.vehicles.is_none());
        assert_eq!(ended.changes.active_mission_id, Some(None));
    }

    #[test]
    fn test_normalize_derives_active_mission() {
        let fleet = FleetData::seed();
        let started = fleet.start_mission(&start_request(12500), now()).unwrap();
        let mut fleet = committed(fleet, started.changes);

        fleet.active_mission_id = None;
        fleet.normalize();
        assert_eq!(fleet.active_mission_id.as_deref(), Some(started.mission.id.as_str()));

        fleet.active_mission_id = Some("gone".to_string());
        fleet.normalize();
        assert_eq!(fleet.active_mission_id.as_deref(), Some(started.mission.id.as_str()));

        fleet.missions.clear();
        fleet.normalize();
        assert_eq!(fleet.active_mission_id, None);
    }

    #[test]
    fn test_snapshot_hides_pins() {
        let snapshot = FleetData::seed().snapshot();
        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value["drivers"][0].get("pin").is_none());
        assert_eq!(value["scriptUrl"], "");
    }

    #[test]
    fn test_duplicate_ids() {
        let errors = duplicate_ids("vehicles", ["1", "2", "1"].into_iter());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "vehicles[].id");
    }
}
