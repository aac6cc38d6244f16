use std::path::PathBuf;
use std::sync::Arc;

use careloop_agents::{PatientContextBuilder, PlausibleRanges, ToolDeps, ToolRouter};
use careloop_channels::{VoiceClient, WhatsAppClient};
use careloop_common::Result;
use careloop_config::{AnomalyConfig, AppConfig};
use careloop_db::{PatientStore, RecordStore, ScheduleStore, SessionStore};
use careloop_outreach::OutreachScheduler;
use tokio::sync::Mutex;

pub type SharedState = Arc<AppState>;

/// Everything the webhook handlers and the firing loop share.
pub struct AppState {
    pub config: AppConfig,
    pub patients: Arc<Mutex<PatientStore>>,
    pub records: Arc<Mutex<RecordStore>>,
    pub sessions: Arc<Mutex<SessionStore>>,
    pub scheduler: OutreachScheduler,
    pub context: PatientContextBuilder,
    pub tools: ToolRouter,
    pub voice: VoiceClient,
    pub whatsapp: WhatsAppClient,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let path = PathBuf::from(&config.database.path);
        let patients = Arc::new(Mutex::new(PatientStore::open(&path)?));
        let records = Arc::new(Mutex::new(RecordStore::open(&path)?));
        let sessions = Arc::new(Mutex::new(SessionStore::open(&path)?));
        let schedules = Arc::new(Mutex::new(ScheduleStore::open(&path)?));
        Ok(Self::assemble(config, patients, records, sessions, schedules))
    }

    /// State over in-memory stores, for tests.
    pub fn in_memory(config: AppConfig) -> Result<Self> {
        let patients = Arc::new(Mutex::new(PatientStore::in_memory()?));
        let records = Arc::new(Mutex::new(RecordStore::in_memory()?));
        let sessions = Arc::new(Mutex::new(SessionStore::in_memory()?));
        let schedules = Arc::new(Mutex::new(ScheduleStore::in_memory()?));
        Ok(Self::assemble(config, patients, records, sessions, schedules))
    }

    fn assemble(
        config: AppConfig,
        patients: Arc<Mutex<PatientStore>>,
        records: Arc<Mutex<RecordStore>>,
        sessions: Arc<Mutex<SessionStore>>,
        schedules: Arc<Mutex<ScheduleStore>>,
    ) -> Self {
        let scheduler = OutreachScheduler::new(Arc::clone(&schedules), Arc::clone(&patients));
        let context = PatientContextBuilder::new(Arc::clone(&patients), Arc::clone(&records));
        let tools = ToolRouter::with_default_tools(ToolDeps::new(
            Arc::clone(&records),
            plausible_ranges(&config.anomaly),
        ));

        let mut voice = VoiceClient::new(
            config.voice.api_key.clone(),
            config.voice.agent_id.clone(),
            config.voice.phone_number_id.clone(),
        );
        if let Some(base_url) = &config.voice.base_url {
            voice = voice.with_base_url(base_url.clone());
        }

        let mut whatsapp = WhatsAppClient::new(
            config.whatsapp.access_token.clone(),
            config.whatsapp.phone_number_id.clone(),
        );
        if let Some(base_url) = &config.whatsapp.base_url {
            whatsapp = whatsapp.with_base_url(base_url.clone());
        }

        Self {
            config,
            patients,
            records,
            sessions,
            scheduler,
            context,
            tools,
            voice,
            whatsapp,
        }
    }
}

fn plausible_ranges(config: &AnomalyConfig) -> PlausibleRanges {
    PlausibleRanges {
        glucose_mg_dl: (config.glucose_min_mg_dl, config.glucose_max_mg_dl),
        sleep_hours: (config.sleep_min_hours, config.sleep_max_hours),
        insulin_units: (config.insulin_min_units, config.insulin_max_units),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_config_maps_to_ranges() {
        let config = AnomalyConfig::default();
        let ranges = plausible_ranges(&config);
        assert_eq!(ranges.glucose_mg_dl, (70.0, 250.0));
        assert_eq!(ranges.sleep_hours, (3.0, 12.0));
        assert_eq!(ranges.insulin_units, (1.0, 60.0));
    }

    #[test]
    fn in_memory_state_builds_with_defaults() {
        let state = AppState::in_memory(AppConfig::default()).expect("state should build");
        assert_eq!(state.tools.definitions().len(), 10);
    }
}
