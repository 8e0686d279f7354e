// src/models/vehicle.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum VehicleType {
    #[serde(rename = "Ambulanza")]
    Ambulance,
    #[serde(rename = "Antincendio")]
    Firefighting,
    #[serde(rename = "Logistica")]
    Logistics,
    #[serde(rename = "Trasporto")]
    Transport,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaintenanceStatus {
    #[default]
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Richiesta")]
    Requested,
    #[serde(rename = "Urgente")]
    Urgent,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(default)]
    pub id: String,
    pub plate: String,
    pub model: String,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
    #[serde(default, with = "optional_date")]
    pub insurance_expiry: Option<NaiveDate>,
    #[serde(default, with = "optional_date")]
    pub revision_expiry: Option<NaiveDate>,
    /// Road tax ("bollo") expiry
    #[serde(default, with = "optional_date")]
    pub stamp_expiry: Option<NaiveDate>,
    #[serde(default)]
    pub maintenance_status: MaintenanceStatus,
    #[serde(default)]
    pub last_km: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyReason {
    InsuranceExpired,
    RevisionExpired,
    StampExpired,
    MaintenanceUrgent,
}

/// A vehicle together with the reasons it needs attention.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UrgentVehicle {
    #[serde(flatten)]
    pub vehicle: Vehicle,
    pub reasons: Vec<UrgencyReason>,
}

impl Vehicle {
    /// Expired compliance dates (strictly before `today`) and the manual urgent flag.
    pub fn urgency_reasons(&self, today: NaiveDate) -> Vec<UrgencyReason> {
        let expired = |date: Option<NaiveDate>| date.is_some_and(|d| d < today);

        let mut reasons = Vec::new();
        if expired(self.insurance_expiry) {
            reasons.push(UrgencyReason::InsuranceExpired);
        }
        if expired(self.revision_expiry) {
            reasons.push(UrgencyReason::RevisionExpired);
        }
        if expired(self.stamp_expiry) {
            reasons.push(UrgencyReason::StampExpired);
        }
        if self.maintenance_status == MaintenanceStatus::Urgent {
            reasons.push(UrgencyReason::MaintenanceUrgent);
        }
        reasons
    }

    pub fn is_urgent(&self, today: NaiveDate) -> bool {
        !self.urgency_reasons(today).is_empty()
    }

    /// Field checks for admin edits; collects every problem instead of stopping at the first.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.plate.trim().is_empty() {
            errors.push(ValidationError::new("plate", "Plate is required"));
        }
        if self.model.trim().is_empty() {
            errors.push(ValidationError::new("model", "Model is required"));
        }
        errors
    }
}

pub fn urgent_vehicles(vehicles: &[Vehicle], today: NaiveDate) -> Vec<UrgentVehicle> {
    vehicles
        .iter()
        .filter_map(|vehicle| {
            let reasons = vehicle.urgency_reasons(today);
            (!reasons.is_empty()).then(|| UrgentVehicle {
                vehicle: vehicle.clone(),
                reasons,
            })
        })
        .collect()
}

/// `YYYY-MM-DD` dates where an empty string means "not recorded".
pub mod optional_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(date) => serializer.serialize_str(&date.format(FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw else { return Ok(None) };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        NaiveDate::parse_from_str(raw, FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}
