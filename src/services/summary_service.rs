// src/services/summary_service.rs
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing;

use crate::{
    config::SummaryConfig,
    errors::{FleetError, FleetResult},
    models::{Mission, Vehicle},
    services::store_service::FleetStore,
};

pub const FALLBACK_SUMMARY: &str = "Impossibile analizzare i dati al momento.";

/// How many of the latest missions go into the prompt.
const RECENT_MISSIONS: usize = 10;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Gemini request failed: {0}")]
    Request(String),

    #[error("Gemini answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Gemini response carried no text")]
    EmptyResponse,

    #[error("Summary generator not configured")]
    NotConfigured,
}

impl From<SummaryError> for FleetError {
    fn from(err: SummaryError) -> Self {
        FleetError::Sync(err.to_string())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FleetSummary {
    pub summary: String,
    pub available: bool,
}

impl FleetSummary {
    fn fallback() -> Self {
        Self {
            summary: FALLBACK_SUMMARY.to_string(),
            available: false,
        }
    }
}

#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn summarize(&self, missions: &[Mission], vehicles: &[Vehicle]) -> FleetResult<String>;
}

pub fn build_prompt(missions: &[Mission], vehicles: &[Vehicle]) -> FleetResult<String> {
    let recent = &missions[missions.len().saturating_sub(RECENT_MISSIONS)..];
    Ok(format!(
        "Agisci come un esperto di logistica della Protezione Civile.\n\
         Analizza i seguenti dati della flotta e delle missioni recenti:\n\n\
         MEZZI: {}\n\
         MISSIONI RECENTI: {}\n\n\
         Fornisci un breve riassunto (massimo 3 punti) in italiano che evidenzi:\n\
         1. Eventuali criticità urgenti (scadenze passate o anomalie segnalate).\n\
         2. Consigli per la manutenzione basati sui KM percorsi.\n\
         3. Una valutazione generale dell'operatività.\n\
         Ritorna il testo in formato Markdown.",
        serde_json::to_string(vehicles)?,
        serde_json::to_string(recent)?,
    ))
}

/// Text of the first candidate in a `generateContent` answer.
pub fn response_text(body: &Value) -> Option<String> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

pub struct GeminiSummaryGenerator {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GeminiSummaryGenerator {
    pub fn new(config: &SummaryConfig, api_key: String) -> FleetResult<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            api_key,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
        })
    }
}

#[async_trait]
impl SummaryGenerator for GeminiSummaryGenerator {
    async fn summarize(&self, missions: &[Mission], vehicles: &[Vehicle]) -> FleetResult<String> {
        let prompt = build_prompt(missions, vehicles)?;
        let request = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| SummaryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::Status { status: status.as_u16(), body }.into());
        }

        let body: Value = response.json().await.map_err(|e| SummaryError::Request(e.to_string()))?;
        response_text(&body).ok_or_else(|| SummaryError::EmptyResponse.into())
    }
}

pub struct DisabledSummaryGenerator;

#[async_trait]
impl SummaryGenerator for DisabledSummaryGenerator {
    async fn summarize(&self, _: &[Mission], _: &[Vehicle]) -> FleetResult<String> {
        Err(SummaryError::NotConfigured.into())
    }
}

pub struct SummaryService {
    store: Arc<dyn FleetStore>,
    generator: Arc<dyn SummaryGenerator>,
}

impl SummaryService {
    pub fn new(store: Arc<dyn FleetStore>, generator: Arc<dyn SummaryGenerator>) -> Self {
        Self { store, generator }
    }

    /// Advisory digest of the fleet. Generator failures degrade to the fallback text.
    pub async fn fleet_summary(&self) -> FleetResult<FleetSummary> {
        let data = self.store.load().await?;
        match self.generator.summarize(&data.missions, &data.vehicles).await {
            Ok(summary) => Ok(FleetSummary { summary, available: true }),
            Err(e) => {
                tracing::warn!("Fleet summary unavailable: {}", e);
                Ok(FleetSummary::fallback())
            }
        }
    }
}
