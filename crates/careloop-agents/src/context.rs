use std::collections::BTreeMap;
use std::sync::Arc;

use careloop_common::{Category, Error, InsulinKind, Measurement, PatientId, Result};
use careloop_db::{HealthRecord, PatientStore, RecordStore};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};
use tokio::sync::Mutex;
use tracing::debug;

/// Builds the flat variable map a conversation is primed with: patient
/// profile, a week of glucose and sleep history, and per-insulin-kind
/// status for the patient's current local day.
///
/// Every key is always present; missing data yields an explicit
/// placeholder string so prompt templates never see an absent variable.
pub struct PatientContextBuilder {
    patients: Arc<Mutex<PatientStore>>,
    records: Arc<Mutex<RecordStore>>,
}

const HISTORY_DAYS: i64 = 7;
/// Lookback used to decide whether a patient is on a given insulin at all.
const INSULIN_LOOKBACK_DAYS: i64 = 30;

impl PatientContextBuilder {
    pub fn new(patients: Arc<Mutex<PatientStore>>, records: Arc<Mutex<RecordStore>>) -> Self {
        Self { patients, records }
    }

    pub async fn build_context(&self, patient_id: &PatientId) -> Result<BTreeMap<String, String>> {
        self.build_context_at(patient_id, Utc::now()).await
    }

    pub async fn build_context_at(
        &self,
        patient_id: &PatientId,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, String>> {
        let patient = self
            .patients
            .lock()
            .await
            .get_patient(patient_id)?
            .ok_or_else(|| Error::Validation(format!("unknown patient: '{patient_id}'")))?;

        let mut vars = BTreeMap::new();
        vars.insert("patient_name".to_string(), patient.name.clone());
        vars.insert(
            "patient_age".to_string(),
            patient
                .age
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        );
        vars.insert(
            "diabetes_type".to_string(),
            patient
                .diabetes_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        );
        vars.insert(
            "years_since_diagnosis".to_string(),
            patient
                .diagnosis_year
                .map(|year| (now.year() - year).max(0).to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        );

        let records = self.records.lock().await;
        let week_ago = now - Duration::days(HISTORY_DAYS);

        let glucose = records.records_between(patient_id, Category::Glucometry, week_ago, now)?;
        vars.insert("glucose_week_summary".to_string(), glucose_summary(&glucose));

        let wellness = records.records_between(patient_id, Category::Wellness, week_ago, now)?;
        vars.insert("sleep_week_summary".to_string(), sleep_summary(&wellness));

        let insulin = records.records_between(
            patient_id,
            Category::Insulin,
            now - Duration::days(INSULIN_LOOKBACK_DAYS),
            now,
        )?;
        let day_start = local_day_start(now, patient.utc_offset_minutes);
        vars.insert(
            "rapid_insulin_today".to_string(),
            insulin_day_status(&insulin, InsulinKind::Rapid, day_start),
        );
        vars.insert(
            "basal_insulin_today".to_string(),
            insulin_day_status(&insulin, InsulinKind::Basal, day_start),
        );

        debug!(patient_id = %patient_id, vars = vars.len(), "built patient context");
        Ok(vars)
    }
}

/// Start of the patient's current local day, expressed in UTC.
fn local_day_start(now: DateTime<Utc>, utc_offset_minutes: i32) -> DateTime<Utc> {
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
    let local = now.with_timezone(&offset);
    let midnight = local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time");
    midnight
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

fn glucose_summary(records: &[HealthRecord]) -> String {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| match r.measurement {
            Measurement::Glucose { mg_dl } => Some(mg_dl),
            _ => None,
        })
        .collect();

    if values.is_empty() {
        return "no glucose readings in the last 7 days".to_string();
    }

    let avg = values.iter().sum::<f64>() / values.len() as f64;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    format!(
        "{} readings in the last 7 days, average {:.0} mg/dL (min {:.0}, max {:.0})",
        values.len(),
        avg,
        min,
        max
    )
}

fn sleep_summary(records: &[HealthRecord]) -> String {
    let hours: Vec<f64> = records
        .iter()
        .filter_map(|r| match r.measurement {
            Measurement::Sleep { hours } => Some(hours),
            _ => None,
        })
        .collect();

    if hours.is_empty() {
        return "no sleep entries in the last 7 days".to_string();
    }

    let avg = hours.iter().sum::<f64>() / hours.len() as f64;
    format!(
        "average {:.1} hours over {} night(s) in the last 7 days",
        avg,
        hours.len()
    )
}

fn insulin_day_status(
    records: &[HealthRecord],
    wanted: InsulinKind,
    day_start: DateTime<Utc>,
) -> String {
    let mut seen_any = false;
    let mut today_units = 0.0;
    let mut logged_today = false;

    for record in records {
        let Measurement::Insulin { units, kind } = record.measurement else {
            continue;
        };
        if kind != wanted {
            continue;
        }
        seen_any = true;
        if record.recorded_at >= day_start {
            logged_today = true;
            today_units += units;
        }
    }

    if logged_today {
        format!("logged {today_units} units today")
    } else if seen_any {
        "not logged today".to_string()
    } else {
        "not configured".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use careloop_common::MeasurementDraft;
    use careloop_db::Patient;

    async fn setup(offset_minutes: i32) -> PatientContextBuilder {
        let patients = PatientStore::in_memory().expect("in-memory store should open");
        patients
            .upsert_patient(&Patient {
                id: PatientId::from("p-1"),
                name: "Ana García".to_string(),
                age: Some(54),
                diabetes_type: Some("type 2".to_string()),
                diagnosis_year: Some(2019),
                phone: Some("+34600111222".to_string()),
                utc_offset_minutes: offset_minutes,
            })
            .expect("upsert should succeed");

        let records = RecordStore::in_memory().expect("in-memory store should open");
        PatientContextBuilder::new(
            Arc::new(Mutex::new(patients)),
            Arc::new(Mutex::new(records)),
        )
    }

    async fn insert(
        builder: &PatientContextBuilder,
        measurement: Measurement,
        at: DateTime<Utc>,
    ) {
        let draft = MeasurementDraft::new(PatientId::from("p-1"), measurement).at(at);
        builder
            .records
            .lock()
            .await
            .insert_record(&draft, false)
            .expect("insert should succeed");
    }

    #[tokio::test]
    async fn empty_history_yields_placeholders_not_missing_keys() {
        let builder = setup(0).await;
        let vars = builder
            .build_context(&PatientId::from("p-1"))
            .await
            .expect("context should build");

        assert_eq!(vars["patient_name"], "Ana García");
        assert_eq!(
            vars["glucose_week_summary"],
            "no glucose readings in the last 7 days"
        );
        assert_eq!(
            vars["sleep_week_summary"],
            "no sleep entries in the last 7 days"
        );
        assert_eq!(vars["rapid_insulin_today"], "not configured");
        assert_eq!(vars["basal_insulin_today"], "not configured");
    }

    #[tokio::test]
    async fn summarizes_week_of_glucose() {
        let builder = setup(0).await;
        let now = Utc::now();
        insert(
            &builder,
            Measurement::Glucose { mg_dl: 100.0 },
            now - Duration::days(2),
        )
        .await;
        insert(
            &builder,
            Measurement::Glucose { mg_dl: 140.0 },
            now - Duration::hours(3),
        )
        .await;
        // Outside the window, must not count.
        insert(
            &builder,
            Measurement::Glucose { mg_dl: 400.0 },
            now - Duration::days(10),
        )
        .await;

        let vars = builder
            .build_context_at(&PatientId::from("p-1"), now)
            .await
            .unwrap();
        assert_eq!(
            vars["glucose_week_summary"],
            "2 readings in the last 7 days, average 120 mg/dL (min 100, max 140)"
        );
    }

    #[tokio::test]
    async fn sleep_summary_ignores_other_wellness_entries() {
        let builder = setup(0).await;
        let now = Utc::now();
        insert(&builder, Measurement::Sleep { hours: 6.0 }, now - Duration::days(1)).await;
        insert(&builder, Measurement::Sleep { hours: 8.0 }, now - Duration::hours(8)).await;
        insert(&builder, Measurement::Stress { level: 7 }, now - Duration::days(1)).await;

        let vars = builder
            .build_context_at(&PatientId::from("p-1"), now)
            .await
            .unwrap();
        assert_eq!(
            vars["sleep_week_summary"],
            "average 7.0 hours over 2 night(s) in the last 7 days"
        );
    }

    #[tokio::test]
    async fn insulin_status_tracks_local_day_and_kind() {
        let builder = setup(0).await;
        // Noon UTC for a UTC patient: the local day started 12 hours ago.
        let now = DateTime::parse_from_rfc3339("2026-03-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        insert(
            &builder,
            Measurement::Insulin {
                units: 6.0,
                kind: InsulinKind::Rapid,
            },
            now - Duration::hours(4),
        )
        .await;
        insert(
            &builder,
            Measurement::Insulin {
                units: 18.0,
                kind: InsulinKind::Basal,
            },
            now - Duration::days(1),
        )
        .await;

        let vars = builder
            .build_context_at(&PatientId::from("p-1"), now)
            .await
            .unwrap();
        assert_eq!(vars["rapid_insulin_today"], "logged 6 units today");
        assert_eq!(vars["basal_insulin_today"], "not logged today");
    }

    #[tokio::test]
    async fn day_boundary_follows_patient_offset() {
        // 2026-03-09T20:00Z. For a UTC+12 patient that is 08:00 on March 10,
        // so their day started at 12:00Z on the 9th and a dose five hours
        // earlier (15:00Z) is still today.
        let now = DateTime::parse_from_rfc3339("2026-03-10T01:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let dose_at = now - Duration::hours(5);

        let ahead = setup(12 * 60).await;
        insert(
            &ahead,
            Measurement::Insulin {
                units: 10.0,
                kind: InsulinKind::Basal,
            },
            dose_at,
        )
        .await;
        let vars = ahead
            .build_context_at(&PatientId::from("p-1"), now)
            .await
            .unwrap();
        assert_eq!(vars["basal_insulin_today"], "logged 10 units today");

        // For a UTC patient the same dose landed before midnight, so it
        // belongs to yesterday.
        let utc_patient = setup(0).await;
        insert(
            &utc_patient,
            Measurement::Insulin {
                units: 10.0,
                kind: InsulinKind::Basal,
            },
            dose_at,
        )
        .await;
        let vars = utc_patient
            .build_context_at(&PatientId::from("p-1"), now)
            .await
            .unwrap();
        assert_eq!(vars["basal_insulin_today"], "not logged today");
    }

    #[tokio::test]
    async fn unknown_patient_is_validation_error() {
        let builder = setup(0).await;
        let err = builder
            .build_context(&PatientId::from("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
