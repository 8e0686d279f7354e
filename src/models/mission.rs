// src/models/mission.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{FleetError, FleetResult, ValidationError};
use crate::utils::id_generator::{IdType, WithGeneratedId};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum MissionStatus {
    #[serde(rename = "In Corso")]
    InProgress,
    #[serde(rename = "Completata")]
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    pub vehicle_id: String,
    pub driver_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub start_km: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_km: Option<u64>,
    pub destination: String,
    pub reason: String,
    pub status: MissionStatus,
    #[serde(default)]
    pub fuel_refill: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartMissionRequest {
    #[serde(default)]
    pub vehicle_id: String,
    #[serde(default)]
    pub driver_id: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub start_km: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndMissionRequest {
    #[serde(default)]
    pub end_km: Option<u64>,
    #[serde(default)]
    pub fuel_refill: bool,
    #[serde(default)]
    pub anomalies: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MissionFilter {
    pub status: Option<MissionStatus>,
}

impl StartMissionRequest {
    /// Field-level checks; references to vehicles and drivers are checked against the fleet.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.vehicle_id.trim().is_empty() {
            errors.push(ValidationError::new("vehicleId", "Vehicle is required"));
        }
        if self.driver_id.trim().is_empty() {
            errors.push(ValidationError::new("driverId", "Driver is required"));
        }
        if self.destination.trim().is_empty() {
            errors.push(ValidationError::new("destination", "Destination is required"));
        }
        if self.reason.trim().is_empty() {
            errors.push(ValidationError::new("reason", "Reason is required"));
        }
        if self.start_km == 0 {
            errors.push(ValidationError::new("startKm", "Starting odometer must be greater than zero"));
        }
        errors
    }
}

impl Mission {
    /// New in-progress mission. The request must already be validated.
    pub fn start(request: &StartMissionRequest, now: DateTime<Utc>) -> Self {
        Mission {
            id: String::new(),
            vehicle_id: request.vehicle_id.trim().to_string(),
            driver_id: request.driver_id.trim().to_string(),
            start_time: now,
            end_time: None,
            start_km: request.start_km,
            end_km: None,
            destination: request.destination.trim().to_string(),
            reason: request.reason.trim().to_string(),
            status: MissionStatus::InProgress,
            fuel_refill: false,
            anomalies: None,
        }
        .with_generated_id(IdType::Mission)
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == MissionStatus::InProgress
    }

    /// Completed copy of this mission; `self` is left untouched on every path.
    pub fn complete(&self, request: &EndMissionRequest, now: DateTime<Utc>) -> FleetResult<Mission> {
        if !self.is_in_progress() {
            return Err(FleetError::MissionAlreadyCompleted(self.id.clone()));
        }

        let end_km = match request.end_km {
            None | Some(0) => {
                return Err(FleetError::validation_error("endKm", "Final odometer reading is required"));
            }
            Some(km) if km < self.start_km => {
                return Err(FleetError::ValidationFailed(vec![ValidationError::new(
                    "endKm",
                    format!("Final odometer ({}) is below the starting one ({})", km, self.start_km),
                )]));
            }
            Some(km) => km,
        };

        let anomalies = request
            .anomalies
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        Ok(Mission {
            end_time: Some(now),
            end_km: Some(end_km),
            status: MissionStatus::Completed,
            fuel_refill: request.fuel_refill,
            anomalies,
            ..self.clone()
        })
    }

    /// Kilometres driven, once completed.
    pub fn distance_km(&self) -> Option<u64> {
        self.end_km.map(|end| end.saturating_sub(self.start_km))
    }

    /// Consistency checks used when a whole mission log is restored.
    pub fn validate_record(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let field = |name: &str| format!("missions[{}].{}", self.id, name);
        if self.id.trim().is_empty() {
            errors.push(ValidationError::new("missions[].id", "Mission id is required"));
        }
        if let Some(end_km) = self.end_km {
            if end_km < self.start_km {
                errors.push(ValidationError::new(field("endKm"), "Final odometer is below the starting one"));
            }
        }
        if self.status == MissionStatus::Completed && self.end_km.is_none() {
            errors.push(ValidationError::new(field("endKm"), "Completed mission without final odometer"));
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(start_km: u64) -> StartMissionRequest {
        StartMissionRequest {
            vehicle_id: "1".to_string(),
            driver_id: "2".to_string(),
            destination: "Sede Provinciale".to_string(),
            reason: "Trasporto materiale".to_string(),
            start_km,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 4, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_start_creates_in_progress_mission() {
        let mission = Mission::start(&request(12500), now());
        assert_eq!(mission.status, MissionStatus::InProgress);
        assert_eq!(mission.start_km, 12500);
        assert_eq!(mission.start_time, now());
        assert!(!mission.fuel_refill);
        assert!(mission.id.starts_with("msn-"));
    }

    #[test]
    fn test_start_request_validation() {
        let mut req = request(0);
        req.destination = "  ".to_string();
        let fields: Vec<String> = req.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["destination", "startKm"]);
        assert!(request(1).validate().is_empty());
    }

    #[test]
    fn test_complete_sets_end_fields() {
        let mission = Mission::start(&request(12500), now());
        let end = EndMissionRequest {
            end_km: Some(12600),
            fuel_refill: true,
            anomalies: Some("  Spia olio accesa ".to_string()),
        };
        let later = now() + chrono::Duration::hours(3);

        let done = mission.complete(&end, later).unwrap();
        assert_eq!(done.status, MissionStatus::Completed);
        assert_eq!(done.end_km, Some(12600));
        assert_eq!(done.end_time, Some(later));
        assert_eq!(done.anomalies.as_deref(), Some("Spia olio accesa"));
        assert!(done.fuel_refill);
        assert_eq!(done.distance_km(), Some(100));
        assert_eq!(done.id, mission.id);
    }

    #[test]
    fn test_complete_rejects_lower_or_missing_odometer() {
        let mission = Mission::start(&request(12500), now());

        let lower = EndMissionRequest { end_km: Some(12400), ..Default::default() };
        let err = mission.complete(&lower, now()).unwrap_err();
        assert_eq!(err.validation_fields(), vec!["endKm"]);

        let missing = EndMissionRequest::default();
        assert!(mission.complete(&missing, now()).unwrap_err().is_validation());

        assert_eq!(mission.status, MissionStatus::InProgress);
        assert_eq!(mission.end_km, None);
    }

    #[test]
    fn test_equal_odometer_is_accepted() {
        let mission = Mission::start(&request(12500), now());
        let end = EndMissionRequest { end_km: Some(12500), ..Default::default() };
        assert_eq!(mission.complete(&end, now()).unwrap().distance_km(), Some(0));
    }

    #[test]
    fn test_completed_mission_is_terminal() {
        let mission = Mission::start(&request(100), now());
        let end = EndMissionRequest { end_km: Some(150), ..Default::default() };
        let done = mission.complete(&end, now()).unwrap();
        assert!(matches!(done.complete(&end, now()), Err(FleetError::MissionAlreadyCompleted(_))));
    }

    #[test]
    fn test_status_wire_values() {
        let mission = Mission::start(&request(100), now());
        let value = serde_json::to_value(&mission).unwrap();
        assert_eq!(value["status"], "In Corso");
        assert_eq!(value["startKm"], 100);
        assert!(value.get("endKm").is_none());

        let parsed: Mission = serde_json::from_value(serde_json::json!({
            "id": "k3j9x0q2m",
            "vehicleId": "1",
            "driverId": "1",
            "startTime": "2024-03-02T09:15:00.000Z",
            "endTime": "2024-03-02T11:40:00.000Z",
            "startKm": 12000,
            "endKm": 12080,
            "destination": "Magazzino",
            "reason": "Esercitazione",
            "status": "Completata",
            "fuelRefill": true,
            "anomalies": ""
        }))
        .unwrap();
        assert_eq!(parsed.status, MissionStatus::Completed);
        assert!(parsed.validate_record().is_empty());
    }
}
