//! Durable snapshot of inventory and schedules.
//!
//! The on-disk record is a flat JSON object:
//!
//! ```json
//! { "pills_funnel_1": 20, "pills_funnel_2": 15,
//!   "schedule_funnel_1": { "day": 2, "hour": 9, "minute": 0 },
//!   "schedule_funnel_2": { "day": null, "hour": null, "minute": null } }
//! ```

use std::path::{Path, PathBuf};

use dispenser_traits::Funnel;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::atomic::write_atomic;
use crate::error::DispenserError;
use crate::inventory::Inventory;
use crate::schedule::Schedule;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScheduleRecord {
    #[serde(default)]
    day: Option<i64>,
    #[serde(default)]
    hour: Option<i64>,
    #[serde(default)]
    minute: Option<i64>,
}

impl ScheduleRecord {
    fn from_schedule(s: &Schedule) -> Self {
        match s.day {
            Some(d) => Self {
                day: Some(i64::from(d)),
                hour: Some(i64::from(s.hour)),
                minute: Some(i64::from(s.minute)),
            },
            None => Self::default(),
        }
    }

    fn to_schedule(&self, funnel: Funnel) -> Schedule {
        let Some(day) = self.day else {
            return Schedule::UNSET;
        };
        let field = |v: Option<i64>| v.and_then(|x| u8::try_from(x).ok());
        let parsed = match (field(Some(day)), field(self.hour), field(self.minute)) {
            (Some(d), Some(h), Some(m)) => Schedule::new(d, h, m),
            _ => None,
        };
        parsed.unwrap_or_else(|| {
            warn!(%funnel, record = ?self, "stored schedule out of range; treating as unset");
            Schedule::UNSET
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateRecord {
    #[serde(default)]
    pills_funnel_1: u32,
    #[serde(default)]
    pills_funnel_2: u32,
    #[serde(default)]
    schedule_funnel_1: ScheduleRecord,
    #[serde(default)]
    schedule_funnel_2: ScheduleRecord,
}

/// Inventory and both schedules, the only durable entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistedState {
    pub inventory: Inventory,
    pub schedules: [Schedule; 2],
}

impl PersistedState {
    pub fn schedule(&self, funnel: Funnel) -> &Schedule {
        &self.schedules[funnel.index()]
    }

    pub fn to_json(&self) -> Result<String, DispenserError> {
        let rec = StateRecord {
            pills_funnel_1: self.inventory.get(Funnel::One),
            pills_funnel_2: self.inventory.get(Funnel::Two),
            schedule_funnel_1: ScheduleRecord::from_schedule(&self.schedules[0]),
            schedule_funnel_2: ScheduleRecord::from_schedule(&self.schedules[1]),
        };
        serde_json::to_string_pretty(&rec).map_err(|e| DispenserError::Persistence(e.to_string()))
    }

    /// Missing keys default to zero pills / unset schedules.
    pub fn from_json(s: &str) -> Result<Self, DispenserError> {
        let rec: StateRecord =
            serde_json::from_str(s).map_err(|e| DispenserError::Persistence(e.to_string()))?;
        Ok(Self {
            inventory: Inventory::new(rec.pills_funnel_1, rec.pills_funnel_2),
            schedules: [
                rec.schedule_funnel_1.to_schedule(Funnel::One),
                rec.schedule_funnel_2.to_schedule(Funnel::Two),
            ],
        })
    }
}

/// File-backed store for [`PersistedState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<PersistedState>, DispenserError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DispenserError::Persistence(format!(
                    "read {}: {e}",
                    self.path.display()
                )));
            }
        };
        let state = PersistedState::from_json(&text).map_err(|e| match e {
            DispenserError::Persistence(m) => {
                DispenserError::Persistence(format!("parse {}: {m}", self.path.display()))
            }
            other => other,
        })?;
        debug!(path = %self.path.display(), "state loaded");
        Ok(Some(state))
    }

    pub fn save(&self, state: &PersistedState) -> Result<(), DispenserError> {
        let json = state.to_json()?;
        write_atomic(&self.path, json.as_bytes()).map_err(|e| {
            DispenserError::Persistence(format!("write {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_schedule_serializes_as_nulls() {
        let st = PersistedState::default();
        let v: serde_json::Value = serde_json::from_str(&st.to_json().unwrap()).unwrap();
        assert_eq!(v["pills_funnel_1"], 0);
        assert!(v["schedule_funnel_2"]["day"].is_null());
        assert!(v["schedule_funnel_2"]["hour"].is_null());
        assert!(v["schedule_funnel_2"]["minute"].is_null());
    }

    #[test]
    fn missing_keys_default() {
        let st = PersistedState::from_json(r#"{"pills_funnel_2": 7}"#).unwrap();
        assert_eq!(st.inventory.counts(), [0, 7]);
        assert_eq!(st.schedules, [Schedule::UNSET; 2]);
    }

    #[test]
    fn out_of_range_schedule_becomes_unset() {
        let st = PersistedState::from_json(
            r#"{"schedule_funnel_1": {"day": 9, "hour": 1, "minute": 2},
                "schedule_funnel_2": {"day": 1, "hour": 25, "minute": 0}}"#,
        )
        .unwrap();
        assert_eq!(st.schedules, [Schedule::UNSET; 2]);
    }

    #[test]
    fn day_without_time_is_unset() {
        let st = PersistedState::from_json(r#"{"schedule_funnel_1": {"day": 2}}"#).unwrap();
        assert!(!st.schedule(Funnel::One).is_set());
    }

    #[test]
    fn garbage_is_a_persistence_error() {
        assert!(matches!(
            PersistedState::from_json("not json"),
            Err(DispenserError::Persistence(_))
        ));
    }
}
