use chrono::{DateTime, Utc};
use db::{models::stop::Stop, types::StopStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only duration derivation over a train's stops. Pure functions of the
/// stop data and the supplied clock; nothing here touches storage and every
/// value is recomputed on read.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTiming {
    pub stop_id: Uuid,
    pub number: i32,
    pub elapsed_minutes: Option<i64>,
    /// Started but not yet completed; `elapsed_minutes` is still growing.
    pub running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainTimings {
    pub per_stop: Vec<StopTiming>,
    pub total_minutes: Option<i64>,
    pub average_stop_minutes: Option<f64>,
}

/// Minutes a stop has been (or was) underway: completion minus start when
/// both are known, clock minus start while still running, nothing otherwise.
pub fn stop_elapsed_minutes(stop: &Stop, now: DateTime<Utc>) -> Option<i64> {
    match (stop.started_at, stop.completed_at) {
        (Some(started), Some(completed)) => Some((completed - started).num_minutes()),
        (Some(started), None) => Some((now - started).num_minutes()),
        _ => None,
    }
}

/// Wall-clock span of the whole run: last completion minus the first start.
pub fn train_total_minutes(stops: &[Stop]) -> Option<i64> {
    let first_start = stops.iter().find_map(|s| s.started_at)?;
    let last_completion = stops.iter().filter_map(|s| s.completed_at).max()?;
    Some((last_completion - first_start).num_minutes())
}

/// Mean stop duration, counting completed stops only.
pub fn average_stop_minutes(stops: &[Stop]) -> Option<f64> {
    let durations: Vec<i64> = stops
        .iter()
        .filter(|s| s.status == StopStatus::Done)
        .filter_map(|s| match (s.started_at, s.completed_at) {
            (Some(started), Some(completed)) => Some((completed - started).num_minutes()),
            _ => None,
        })
        .collect();

    if durations.is_empty() {
        return None;
    }
    Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
}

pub fn derive_timings(stops: &[Stop], now: DateTime<Utc>) -> TrainTimings {
    TrainTimings {
        per_stop: stops
            .iter()
            .map(|stop| StopTiming {
                stop_id: stop.id,
                number: stop.number,
                elapsed_minutes: stop_elapsed_minutes(stop, now),
                running: stop.started_at.is_some() && stop.completed_at.is_none(),
            })
            .collect(),
        total_minutes: train_total_minutes(stops),
        average_stop_minutes: average_stop_minutes(stops),
    }
}
