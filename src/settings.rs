//! Per-user planner settings, stored under `settings/<user>`.
//!
//! Users without saved settings get the `[planning]` defaults from the config
//! file.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::{self, PlanningDefaults};
use crate::error::PlanError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub daily_budget_minutes: u32,
    /// `HH:MM` local time.
    pub day_start: String,
    /// IANA timezone name.
    pub timezone: String,
    pub allow_partial: bool,
    /// `None` until the user saves settings.
    pub updated_at: Option<DateTime<Utc>>,
}

/// `PUT /settings` body; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_budget_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_partial: Option<bool>,
}

pub fn settings_key(user: &str) -> Vec<u8> {
    format!("settings/{user}").into_bytes()
}

impl UserSettings {
    pub fn from_defaults(defaults: &PlanningDefaults) -> Self {
        Self {
            daily_budget_minutes: defaults.daily_budget_minutes,
            day_start: defaults.day_start.clone(),
            timezone: defaults.timezone.clone(),
            allow_partial: defaults.allow_partial,
            updated_at: None,
        }
    }

    pub fn tz(&self) -> Result<Tz, PlanError> {
        config::parse_timezone(&self.timezone).map_err(|_| PlanError::UnknownTimezone {
            name: self.timezone.clone(),
        })
    }

    pub fn start_time(&self) -> Result<NaiveTime, PlanError> {
        config::parse_day_start(&self.day_start).map_err(|_| PlanError::InvalidSettings {
            field: "day_start".into(),
            message: format!("expected HH:MM, got {:?}", self.day_start),
        })
    }

    /// Apply a patch; nothing changes if any field is invalid.
    pub fn apply(&mut self, patch: SettingsPatch, now: DateTime<Utc>) -> Result<(), PlanError> {
        let mut next = self.clone();
        if let Some(budget) = patch.daily_budget_minutes {
            if budget == 0 || budget > 24 * 60 {
                return Err(PlanError::InvalidSettings {
                    field: "daily_budget_minutes".into(),
                    message: format!("must be within 1-1440, got {budget}"),
                });
            }
            next.daily_budget_minutes = budget;
        }
        if let Some(start) = patch.day_start {
            next.day_start = start.trim().to_string();
        }
        if let Some(tz) = patch.timezone {
            next.timezone = tz.trim().to_string();
        }
        if let Some(allow) = patch.allow_partial {
            next.allow_partial = allow;
        }
        next.start_time()?;
        next.tz()?;
        next.updated_at = Some(now);
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn defaults_come_from_config() {
        let s = UserSettings::from_defaults(&PlanningDefaults::default());
        assert_eq!(s.daily_budget_minutes, 480);
        assert_eq!(s.tz().unwrap(), Tz::UTC);
        assert!(s.updated_at.is_none());
    }

    #[test]
    fn patch_validates_all_or_nothing() {
        let mut s = UserSettings::from_defaults(&PlanningDefaults::default());
        let before = s.clone();
        let err = s.apply(
            SettingsPatch {
                daily_budget_minutes: Some(300),
                timezone: Some("Nowhere/Land".into()),
                ..SettingsPatch::default()
            },
            now(),
        );
        assert!(matches!(err, Err(PlanError::UnknownTimezone { .. })));
        assert_eq!(s, before);

        assert!(matches!(
            s.apply(
                SettingsPatch {
                    daily_budget_minutes: Some(0),
                    ..SettingsPatch::default()
                },
                now()
            ),
            Err(PlanError::InvalidSettings { .. })
        ));

        s.apply(
            SettingsPatch {
                daily_budget_minutes: Some(300),
                day_start: Some("07:30".into()),
                timezone: Some("Europe/Berlin".into()),
                allow_partial: Some(false),
            },
            now(),
        )
        .unwrap();
        assert_eq!(s.daily_budget_minutes, 300);
        assert_eq!(s.start_time().unwrap(), NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(s.updated_at, Some(now()));
    }
}
