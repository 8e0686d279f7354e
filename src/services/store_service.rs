// src/services/store_service.rs
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing;

use crate::{
    config::StorageBackend,
    errors::{FleetError, FleetResult},
    models::{Driver, FleetChanges, FleetData, Mission, Vehicle},
};

/// Whole-fleet persistence with revision-checked commits.
///
/// Every write names the revision it was computed from; a store whose
/// revision moved on in the meantime rejects the write with
/// [`FleetError::StaleRevision`] and keeps its content.
#[async_trait]
pub trait FleetStore: Send + Sync {
    async fn load(&self) -> FleetResult<FleetData>;

    /// Applies every collection in `changes` at once and returns the new state.
    async fn commit(&self, changes: FleetChanges, expected_revision: u64) -> FleetResult<FleetData>;

    fn backend_name(&self) -> &'static str;

    async fn save_vehicles(&self, vehicles: Vec<Vehicle>, expected_revision: u64) -> FleetResult<u64> {
        let data = self.commit(FleetChanges::vehicles(vehicles), expected_revision).await?;
        Ok(data.revision)
    }

    async fn save_drivers(&self, drivers: Vec<Driver>, expected_revision: u64) -> FleetResult<u64> {
        let data = self.commit(FleetChanges::drivers(drivers), expected_revision).await?;
        Ok(data.revision)
    }

    /// Replaces the mission log; the active mission is re-derived from it.
    async fn save_missions(&self, missions: Vec<Mission>, expected_revision: u64) -> FleetResult<u64> {
        let active = missions.iter().find(|m| m.is_in_progress()).map(|m| m.id.clone());
        let data = self
            .commit(FleetChanges::missions(missions, active), expected_revision)
            .await?;
        Ok(data.revision)
    }

    async fn save_script_url(&self, url: String, expected_revision: u64) -> FleetResult<u64> {
        let data = self.commit(FleetChanges::script_url(url), expected_revision).await?;
        Ok(data.revision)
    }
}

pub async fn open_store(backend: &StorageBackend) -> FleetResult<Arc<dyn FleetStore>> {
    let store: Arc<dyn FleetStore> = match backend {
        StorageBackend::JsonFile(path) => Arc::new(JsonFileStore::open(path).await?),
        StorageBackend::Redis(url) => Arc::new(RedisStore::connect(url).await?),
        StorageBackend::Memory => Arc::new(MemoryStore::seeded()),
    };
    tracing::info!("Fleet store ready: {}", store.backend_name());
    Ok(store)
}

fn check_revision(data: &FleetData, expected: u64) -> FleetResult<()> {
    if data.revision != expected {
        tracing::warn!("Rejected stale write: expected revision {}, store is at {}", expected, data.revision);
        return Err(FleetError::StaleRevision {
            expected,
            found: data.revision,
        });
    }
    Ok(())
}

// ------------------------------
// Memory store (development/testing)
// ------------------------------

pub struct MemoryStore {
    data: RwLock<FleetData>,
}

impl MemoryStore {
    pub fn new(mut data: FleetData) -> Self {
        data.normalize();
        Self { data: RwLock::new(data) }
    }

    pub fn seeded() -> Self {
        Self::new(FleetData::seed())
    }
}

#[async_trait]
impl FleetStore for MemoryStore {
    async fn load(&self) -> FleetResult<FleetData> {
        Ok(self.data.read().await.clone())
    }

    async fn commit(&self, changes: FleetChanges, expected_revision: u64) -> FleetResult<FleetData> {
        let mut data = self.data.write().await;
        check_revision(&data, expected_revision)?;
        changes.apply_to(&mut data);
        Ok(data.clone())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ------------------------------
// JSON file store
// ------------------------------

pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens the data file, creating it with the seed fleet when missing.
    pub async fn open(path: impl Into<PathBuf>) -> FleetResult<Self> {
        let store = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };

        if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        store.recover_interrupted_write().await;

        if fs::try_exists(&store.path).await? {
            let data = store.read().await?;
            tracing::info!(
                "Loaded {} ({} vehicles, {} drivers, {} missions, revision {})",
                store.path.display(),
                data.vehicles.len(),
                data.drivers.len(),
                data.missions.len(),
                data.revision
            );
        } else {
            tracing::info!("{} not found, creating it with default data", store.path.display());
            store.write_atomic(&FleetData::seed()).await?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("data.json"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read(&self) -> FleetResult<FleetData> {
        let content = fs::read_to_string(&self.path).await?;
        let mut data: FleetData = serde_json::from_str(&content).map_err(|e| {
            FleetError::Storage(format!("{} is not valid fleet data: {}", self.path.display(), e))
        })?;
        data.normalize();
        Ok(data)
    }

    async fn write_atomic(&self, data: &FleetData) -> FleetResult<()> {
        let tmp_path = self.temp_path();
        let content = serde_json::to_string_pretty(data)?;

        fs::write(&tmp_path, content).await?;

        let sync_path = tmp_path.clone();
        match tokio::task::spawn_blocking(move || std::fs::File::open(&sync_path).and_then(|f| f.sync_all())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to sync {}: {}", tmp_path.display(), e),
            Err(e) => tracing::warn!("Sync task for {} failed: {}", tmp_path.display(), e),
        }

        fs::rename(&tmp_path, &self.path).await?;
        tracing::debug!("Wrote {} (revision {})", self.path.display(), data.revision);
        Ok(())
    }

    async fn recover_interrupted_write(&self) {
        let tmp_path = self.temp_path();
        if fs::remove_file(&tmp_path).await.is_ok() {
            tracing::warn!("Removed leftover {} from an interrupted write", tmp_path.display());
        }
    }
}

#[async_trait]
impl FleetStore for JsonFileStore {
    async fn load(&self) -> FleetResult<FleetData> {
        self.read().await
    }

    async fn commit(&self, changes: FleetChanges, expected_revision: u64) -> FleetResult<FleetData> {
        let _guard = self.write_lock.lock().await;
        let mut data = self.read().await?;
        check_revision(&data, expected_revision)?;
        changes.apply_to(&mut data);
        self.write_atomic(&data).await?;
        Ok(data)
    }

    fn backend_name(&self) -> &'static str {
        "json-file"
    }
}

// ------------------------------
// Redis store
// ------------------------------

// Same key names the browser build used in localStorage.
const VEHICLES_KEY: &str = "pc_vehicles";
const DRIVERS_KEY: &str = "pc_drivers";
const MISSIONS_KEY: &str = "pc_missions";
const SCRIPT_URL_KEY: &str = "pc_google_script_url";
const ACTIVE_MISSION_KEY: &str = "pc_active_mission";
const REVISION_KEY: &str = "pc_revision";

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> FleetResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let store = Self { client };

        let mut conn = store.connection().await?;
        let existing: u32 = redis::cmd("EXISTS")
            .arg(VEHICLES_KEY)
            .arg(DRIVERS_KEY)
            .arg(MISSIONS_KEY)
            .query_async(&mut conn)
            .await?;

        if existing == 0 {
            tracing::info!("Redis has no fleet data, writing defaults");
            let seed = FleetData::seed();
            let mut pipe = redis::pipe();
            pipe.atomic()
                .cmd("SET").arg(VEHICLES_KEY).arg(serde_json::to_string(&seed.vehicles)?).ignore()
                .cmd("SET").arg(DRIVERS_KEY).arg(serde_json::to_string(&seed.drivers)?).ignore()
                .cmd("SET").arg(MISSIONS_KEY).arg(serde_json::to_string(&seed.missions)?).ignore()
                .cmd("SET").arg(SCRIPT_URL_KEY).arg(&seed.script_url).ignore()
                .cmd("SET").arg(REVISION_KEY).arg(0u64).ignore();
            let _: () = pipe.query_async(&mut conn).await?;
        }

        Ok(store)
    }

    // WATCH state is per connection, so every commit gets its own.
    async fn connection(&self) -> FleetResult<redis::aio::Connection> {
        Ok(self.client.get_async_connection().await?)
    }

    async fn read(conn: &mut redis::aio::Connection) -> FleetResult<FleetData> {
        let (vehicles, drivers, missions, script_url, active, revision): (
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<u64>,
        ) = redis::cmd("MGET")
            .arg(VEHICLES_KEY)
            .arg(DRIVERS_KEY)
            .arg(MISSIONS_KEY)
            .arg(SCRIPT_URL_KEY)
            .arg(ACTIVE_MISSION_KEY)
            .arg(REVISION_KEY)
            .query_async(conn)
            .await?;

        let mut data = FleetData {
            vehicles: parse_collection(VEHICLES_KEY, vehicles)?,
            drivers: parse_collection(DRIVERS_KEY, drivers)?,
            missions: parse_collection(MISSIONS_KEY, missions)?,
            script_url: script_url.unwrap_or_default(),
            revision: revision.unwrap_or(0),
            active_mission_id: active,
        };
        data.normalize();
        Ok(data)
    }
}

fn parse_collection<T: serde::de::DeserializeOwned>(key: &str, raw: Option<String>) -> FleetResult<Vec<T>> {
    match raw {
        Some(json) => serde_json::from_str(&json)
            .map_err(|e| FleetError::Storage(format!("Redis key {} holds invalid data: {}", key, e))),
        None => Ok(Vec::new()),
    }
}

#[async_trait]
impl FleetStore for RedisStore {
    async fn load(&self) -> FleetResult<FleetData> {
        let mut conn = self.connection().await?;
        Self::read(&mut conn).await
    }

    async fn commit(&self, changes: FleetChanges, expected_revision: u64) -> FleetResult<FleetData> {
        let mut conn = self.connection().await?;

        let _: () = redis::cmd("WATCH").arg(REVISION_KEY).query_async(&mut conn).await?;
        let mut data = Self::read(&mut conn).await?;
        if let Err(stale) = check_revision(&data, expected_revision) {
            let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await?;
            return Err(stale);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(vehicles) = &changes.vehicles {
            pipe.cmd("SET").arg(VEHICLES_KEY).arg(serde_json::to_string(vehicles)?).ignore();
        }
        if let Some(drivers) = &changes.drivers {
            pipe.cmd("SET").arg(DRIVERS_KEY).arg(serde_json::to_string(drivers)?).ignore();
        }
        if let Some(missions) = &changes.missions {
            pipe.cmd("SET").arg(MISSIONS_KEY).arg(serde_json::to_string(missions)?).ignore();
        }
        if let Some(url) = &changes.script_url {
            pipe.cmd("SET").arg(SCRIPT_URL_KEY).arg(url).ignore();
        }
        match &changes.active_mission_id {
            Some(Some(id)) => {
                pipe.cmd("SET").arg(ACTIVE_MISSION_KEY).arg(id).ignore();
            }
            Some(None) => {
                pipe.cmd("DEL").arg(ACTIVE_MISSION_KEY).ignore();
            }
            None => {}
        }
        pipe.cmd("INCR").arg(REVISION_KEY);

        // EXEC answers nil when the watched revision moved.
        let result: Option<(u64,)> = pipe.query_async(&mut conn).await?;
        match result {
            Some((revision,)) => {
                changes.apply_to(&mut data);
                data.revision = revision;
                Ok(data)
            }
            None => {
                let found: Option<u64> = redis::cmd("GET").arg(REVISION_KEY).query_async(&mut conn).await?;
                Err(FleetError::StaleRevision {
                    expected: expected_revision,
                    found: found.unwrap_or(0),
                })
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MissionStatus;
    use serde_json::json;

    fn temp_data_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("pc-fleet-sync-{}", nanoid::nanoid!(10)))
            .join(name)
    }

    async fn shared_contract(store: &dyn FleetStore) {
        let data = store.load().await.unwrap();
        assert_eq!(data.vehicles.len(), 2);
        let revision = data.revision;

        let mut vehicles = data.vehicles.clone();
        vehicles[0].last_km = 13000;
        let new_revision = store.save_vehicles(vehicles, revision).await.unwrap();
        assert_eq!(new_revision, revision + 1);

        // writing from the old snapshot again must fail and change nothing
        let err = store.save_script_url("https://example.org/hook".to_string(), revision).await.unwrap_err();
        assert!(matches!(err, FleetError::StaleRevision { expected, found } if expected == revision && found == revision + 1));

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.vehicles[0].last_km, 13000);
        assert_eq!(reloaded.script_url, "");
        assert_eq!(reloaded.revision, revision + 1);
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryStore::seeded();
        shared_contract(&store).await;
    }

    #[tokio::test]
    async fn test_json_store_contract() {
        let path = temp_data_path("data.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        shared_contract(&store).await;

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap().vehicles[0].last_km, 13000);
        assert!(!fs::try_exists(store.temp_path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_json_store_reads_original_format() {
        let path = temp_data_path("data.json");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        let original = json!({
            "vehicles": [{ "id": "1", "plate": "PC 123 AA", "model": "Land Rover Defender", "type": "Antincendio",
                "insuranceExpiry": "2024-12-31", "revisionExpiry": "2024-06-15", "stampExpiry": "2025-01-20",
                "maintenanceStatus": "OK", "lastKm": 12500 }],
            "drivers": [{ "id": "1", "name": "Mario Rossi", "license": "B, C", "isAdmin": true, "pin": "1234" }],
            "missions": [{ "id": "lq2x8f0ab", "vehicleId": "1", "driverId": "1", "startTime": "2024-11-02T07:30:00.000Z",
                "startKm": 12500, "destination": "Magazzino", "reason": "Rifornimento", "status": "In Corso", "fuelRefill": false }],
            "scriptUrl": ""
        });
        fs::write(&path, serde_json::to_string_pretty(&original).unwrap()).await.unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        let data = store.load().await.unwrap();
        assert_eq!(data.revision, 0);
        assert_eq!(data.active_mission_id.as_deref(), Some("lq2x8f0ab"));
        assert_eq!(data.missions[0].status, MissionStatus::InProgress);

        store.save_script_url("https://script.google.com/macros/s/x/exec".to_string(), 0).await.unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written["revision"], 1);
        assert_eq!(written["activeMissionId"], "lq2x8f0ab");
        assert_eq!(written["vehicles"][0]["type"], "Antincendio");
    }

    #[tokio::test]
    async fn test_json_store_rejects_corrupt_file() {
        let path = temp_data_path("data.json");
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, "{ not json").await.unwrap();

        let err = JsonFileStore::open(&path).await.err().unwrap();
        assert!(matches!(err, FleetError::Storage(_)));
        // the broken file is left for the operator to inspect
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn test_json_store_removes_leftover_temp_file() {
        let path = temp_data_path("fleet.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        fs::write(store.temp_path(), "partial").await.unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert!(!fs::try_exists(reopened.temp_path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_missions_derives_active() {
        let store = MemoryStore::seeded();
        let data = store.load().await.unwrap();
        let transition = data
            .start_mission(
                &crate::models::StartMissionRequest {
                    vehicle_id: "2".to_string(),
                    driver_id: "1".to_string(),
                    destination: "Ospedale".to_string(),
                    reason: "Trasferimento".to_string(),
                    start_km: 45000,
                },
                chrono::Utc::now(),
            )
            .unwrap();

        store.save_missions(vec![transition.mission.clone()], data.revision).await.unwrap();
        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.active_mission_id, Some(transition.mission.id));
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_redis_store_contract() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let store = RedisStore::connect(&url).await.unwrap();
        shared_contract(&store).await;
    }
}
