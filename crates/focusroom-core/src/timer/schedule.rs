use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One timed interval of the focus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Work,
    ShortBreak,
    LongBreak,
}

impl Phase {
    /// Label shown on the timer face and the overlay.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Work => "Focus",
            Phase::ShortBreak => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }

    /// Stored `session_type` value.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Work => "work",
            Phase::ShortBreak => "short_break",
            Phase::LongBreak => "long_break",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "work" => Some(Phase::Work),
            "short_break" => Some(Phase::ShortBreak),
            "long_break" => Some(Phase::LongBreak),
            _ => None,
        }
    }

    pub fn is_break(self) -> bool {
        !matches!(self, Phase::Work)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user timer settings.
///
/// Field names match the persisted `pomodoro_settings` record so the same
/// struct serializes to SQLite, the REST store and TOML without mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_work_duration")]
    pub work_duration: u32,
    #[serde(default = "default_short_break")]
    pub short_break_duration: u32,
    #[serde(default = "default_long_break")]
    pub long_break_duration: u32,
    #[serde(default = "default_sessions_before_long_break")]
    pub sessions_before_long_break: u32,
    #[serde(default)]
    pub auto_start_breaks: bool,
    #[serde(default)]
    pub auto_start_pomodoros: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_sound: Option<String>,
}

fn default_work_duration() -> u32 {
    25
}
fn default_short_break() -> u32 {
    5
}
fn default_long_break() -> u32 {
    15
}
fn default_sessions_before_long_break() -> u32 {
    4
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            work_duration: default_work_duration(),
            short_break_duration: default_short_break(),
            long_break_duration: default_long_break(),
            sessions_before_long_break: default_sessions_before_long_break(),
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            notification_sound: None,
        }
    }
}

impl SessionConfig {
    /// Duration of `phase` in minutes.
    pub fn minutes_for(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Work => self.work_duration,
            Phase::ShortBreak => self.short_break_duration,
            Phase::LongBreak => self.long_break_duration,
        }
    }

    /// Duration of `phase` in seconds.
    ///
    /// Uses saturating arithmetic so absurd user input cannot overflow.
    pub fn seconds_for(&self, phase: Phase) -> u64 {
        u64::from(self.minutes_for(phase)).saturating_mul(60)
    }

    /// Whether the sequencer re-arms the clock by itself after completing
    /// a phase and landing on `next`.
    pub fn auto_starts(&self, next: Phase) -> bool {
        if next.is_break() {
            self.auto_start_breaks
        } else {
            self.auto_start_pomodoros
        }
    }

    /// Reject non-positive durations and a zero long-break threshold.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let checks = [
            ("work_duration", self.work_duration),
            ("short_break_duration", self.short_break_duration),
            ("long_break_duration", self.long_break_duration),
            ("sessions_before_long_break", self.sessions_before_long_break),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ValidationError::InvalidValue {
                    field: field.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Set one field by its persisted name, parsing `value`.
    ///
    /// The result is validated; on error `self` is left untouched.
    pub fn set_field(&mut self, key: &str, value: &str) -> Result<(), ValidationError> {
        let mut next = self.clone();
        let invalid = |message: String| ValidationError::InvalidValue {
            field: key.to_string(),
            message,
        };
        let parse_u32 = |v: &str| {
            v.parse::<u32>()
                .map_err(|_| invalid(format!("cannot parse '{v}' as a whole number")))
        };
        let parse_bool = |v: &str| {
            v.parse::<bool>()
                .map_err(|_| invalid(format!("cannot parse '{v}' as true/false")))
        };
        match key {
            "work_duration" => next.work_duration = parse_u32(value)?,
            "short_break_duration" => next.short_break_duration = parse_u32(value)?,
            "long_break_duration" => next.long_break_duration = parse_u32(value)?,
            "sessions_before_long_break" => next.sessions_before_long_break = parse_u32(value)?,
            "auto_start_breaks" => next.auto_start_breaks = parse_bool(value)?,
            "auto_start_pomodoros" => next.auto_start_pomodoros = parse_bool(value)?,
            "notification_sound" => {
                next.notification_sound = (!value.is_empty()).then(|| value.to_string())
            }
            _ => return Err(invalid("unknown setting".to_string())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}
