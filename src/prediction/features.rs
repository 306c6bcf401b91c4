//! Model input features
//!
//! Mirrors the feature schema the risk model service accepts: profile answers
//! from onboarding plus journal and health aggregates. Every field defaults
//! to its "unknown" value, which is what an untouched form submits.

use crate::error::EngineError;
use serde::{Deserialize, Deserializer, Serialize};

pub const UNKNOWN_LABEL: &str = "unknown";
pub const NEUTRAL_EMOTION: &str = "neutral";

/// Days-since counters default to this when nothing was ever logged
pub const NEVER_LOGGED_DAYS: u32 = 999;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelapseFeatures {
    // Profile
    pub age: f64,
    pub age_of_onset: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years_since_onset: Option<f64>,
    pub pulling_severity: f64,
    pub pulling_frequency: String,
    pub pulling_awareness: String,
    #[serde(deserialize_with = "deserialize_boolish")]
    pub successfully_stopped: bool,
    pub how_long_stopped_days: f64,
    pub emotion: String,

    // Journal: urges
    pub avg_urge_7d: f64,
    pub avg_urge_30d: f64,
    pub max_urge_7d: f64,
    pub high_urge_events_7d: u32,
    pub num_journal_entries_7d: u32,
    pub num_journal_entries_30d: u32,
    pub days_since_last_entry: u32,

    // Journal: moods
    pub pct_stress_moods_30d: f64,
    pub pct_calm_moods_30d: f64,
    pub pct_happy_moods_30d: f64,

    // Journal: triggers
    pub count_trigger_stress_30d: u32,
    pub count_trigger_boredom_30d: u32,
    pub count_trigger_anxiety_30d: u32,
    pub count_trigger_fatigue_30d: u32,
    pub count_trigger_bodyfocus_30d: u32,
    pub count_trigger_screentime_30d: u32,
    pub count_trigger_social_30d: u32,
    pub count_trigger_other_30d: u32,

    // Health: sleep
    pub avg_sleep_7d: f64,
    pub avg_sleep_30d: f64,
    pub min_sleep_7d: f64,
    pub short_sleep_nights_7d: u32,

    // Health: stress
    pub avg_health_stress_7d: f64,
    pub avg_health_stress_30d: f64,
    pub max_health_stress_7d: f64,
    pub high_stress_days_7d: u32,

    // Health: exercise
    pub avg_exercise_7d: f64,
    pub avg_exercise_30d: f64,
    pub days_with_any_exercise_7d: u32,
    pub num_health_logs_7d: u32,
    pub num_health_logs_30d: u32,
    pub days_since_last_health_log: u32,

    // Combined
    pub high_urge_and_high_stress_days_7d: u32,
}

impl Default for RelapseFeatures {
    fn default() -> Self {
        Self {
            age: 0.0,
            age_of_onset: 0.0,
            years_since_onset: None,
            pulling_severity: 0.0,
            pulling_frequency: UNKNOWN_LABEL.to_string(),
            pulling_awareness: UNKNOWN_LABEL.to_string(),
            successfully_stopped: false,
            how_long_stopped_days: 0.0,
            emotion: NEUTRAL_EMOTION.to_string(),
            avg_urge_7d: 0.0,
            avg_urge_30d: 0.0,
            max_urge_7d: 0.0,
            high_urge_events_7d: 0,
            num_journal_entries_7d: 0,
            num_journal_entries_30d: 0,
            days_since_last_entry: NEVER_LOGGED_DAYS,
            pct_stress_moods_30d: 0.0,
            pct_calm_moods_30d: 0.0,
            pct_happy_moods_30d: 0.0,
            count_trigger_stress_30d: 0,
            count_trigger_boredom_30d: 0,
            count_trigger_anxiety_30d: 0,
            count_trigger_fatigue_30d: 0,
            count_trigger_bodyfocus_30d: 0,
            count_trigger_screentime_30d: 0,
            count_trigger_social_30d: 0,
            count_trigger_other_30d: 0,
            avg_sleep_7d: 0.0,
            avg_sleep_30d: 0.0,
            min_sleep_7d: 0.0,
            short_sleep_nights_7d: 0,
            avg_health_stress_7d: 0.0,
            avg_health_stress_30d: 0.0,
            max_health_stress_7d: 0.0,
            high_stress_days_7d: 0,
            avg_exercise_7d: 0.0,
            avg_exercise_30d: 0.0,
            days_with_any_exercise_7d: 0,
            num_health_logs_7d: 0,
            num_health_logs_30d: 0,
            days_since_last_health_log: NEVER_LOGGED_DAYS,
            high_urge_and_high_stress_days_7d: 0,
        }
    }
}

impl RelapseFeatures {
    /// All numeric inputs by name
    fn numeric_inputs(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("age", self.age),
            ("age_of_onset", self.age_of_onset),
            ("years_since_onset", self.years_since_onset.unwrap_or(0.0)),
            ("pulling_severity", self.pulling_severity),
            ("how_long_stopped_days", self.how_long_stopped_days),
            ("avg_urge_7d", self.avg_urge_7d),
            ("avg_urge_30d", self.avg_urge_30d),
            ("max_urge_7d", self.max_urge_7d),
            ("high_urge_events_7d", self.high_urge_events_7d.into()),
            ("num_journal_entries_7d", self.num_journal_entries_7d.into()),
            ("num_journal_entries_30d", self.num_journal_entries_30d.into()),
            ("days_since_last_entry", self.days_since_last_entry.into()),
            ("pct_stress_moods_30d", self.pct_stress_moods_30d),
            ("pct_calm_moods_30d", self.pct_calm_moods_30d),
            ("pct_happy_moods_30d", self.pct_happy_moods_30d),
            ("count_trigger_stress_30d", self.count_trigger_stress_30d.into()),
            ("count_trigger_boredom_30d", self.count_trigger_boredom_30d.into()),
            ("count_trigger_anxiety_30d", self.count_trigger_anxiety_30d.into()),
            ("count_trigger_fatigue_30d", self.count_trigger_fatigue_30d.into()),
            ("count_trigger_bodyfocus_30d", self.count_trigger_bodyfocus_30d.into()),
            ("count_trigger_screentime_30d", self.count_trigger_screentime_30d.into()),
            ("count_trigger_social_30d", self.count_trigger_social_30d.into()),
            ("count_trigger_other_30d", self.count_trigger_other_30d.into()),
            ("avg_sleep_7d", self.avg_sleep_7d),
            ("avg_sleep_30d", self.avg_sleep_30d),
            ("min_sleep_7d", self.min_sleep_7d),
            ("short_sleep_nights_7d", self.short_sleep_nights_7d.into()),
            ("avg_health_stress_7d", self.avg_health_stress_7d),
            ("avg_health_stress_30d", self.avg_health_stress_30d),
            ("max_health_stress_7d", self.max_health_stress_7d),
            ("high_stress_days_7d", self.high_stress_days_7d.into()),
            ("avg_exercise_7d", self.avg_exercise_7d),
            ("avg_exercise_30d", self.avg_exercise_30d),
            ("days_with_any_exercise_7d", self.days_with_any_exercise_7d.into()),
            ("num_health_logs_7d", self.num_health_logs_7d.into()),
            ("num_health_logs_30d", self.num_health_logs_30d.into()),
            ("days_since_last_health_log", self.days_since_last_health_log.into()),
            (
                "high_urge_and_high_stress_days_7d",
                self.high_urge_and_high_stress_days_7d.into(),
            ),
        ]
    }

    /// Check ranges the model service would reject
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in self.numeric_inputs() {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::Validation(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let bounded = [
            ("age", self.age, 120.0),
            ("age_of_onset", self.age_of_onset, 120.0),
            ("years_since_onset", self.years_since_onset.unwrap_or(0.0), 120.0),
            ("pulling_severity", self.pulling_severity, 10.0),
        ];
        for (name, value, max) in bounded {
            if value > max {
                return Err(EngineError::Validation(format!(
                    "{} must be at most {}, got {}",
                    name, max, value
                )));
            }
        }

        Ok(())
    }

    /// True when every input still holds its default, i.e. the form was
    /// never filled in. Predicting on that would be meaningless.
    pub fn is_trivial(&self) -> bool {
        let prepared = self.prepared();
        let defaults = Self::default();

        let numbers_untouched = prepared
            .numeric_inputs()
            .iter()
            .zip(defaults.numeric_inputs().iter())
            .all(|((_, value), (_, default))| value == default);

        numbers_untouched
            && !prepared.successfully_stopped
            && prepared.pulling_frequency == UNKNOWN_LABEL
            && prepared.pulling_awareness == UNKNOWN_LABEL
            && prepared.emotion == NEUTRAL_EMOTION
    }

    /// Copy with categorical answers canonicalised and `years_since_onset`
    /// derived from age when absent.
    pub fn prepared(&self) -> Self {
        let mut out = self.clone();

        out.pulling_frequency = or_label(normalize_frequency(&self.pulling_frequency), UNKNOWN_LABEL);
        out.pulling_awareness = or_label(normalize_label(&self.pulling_awareness), UNKNOWN_LABEL);
        out.emotion = or_label(normalize_label(&self.emotion), NEUTRAL_EMOTION);

        if out.years_since_onset.is_none() && self.age > 0.0 {
            out.years_since_onset = Some((self.age - self.age_of_onset).max(0.0));
        }

        out
    }
}

/// Lower-case and collapse internal whitespace
pub fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map free-text pulling frequency onto the model's vocabulary.
///
/// Unrecognised text is passed through normalised.
pub fn normalize_frequency(raw: &str) -> String {
    let v = normalize_label(raw);
    let canonical = if v.is_empty() {
        ""
    } else if v.contains("several") && v.contains("week") {
        "several times a week"
    } else if v.contains("day") {
        "daily"
    } else if v.contains("week") {
        "weekly"
    } else if v.contains("month") {
        "monthly"
    } else if v.contains("rare") {
        "rarely"
    } else {
        return v;
    };
    canonical.to_string()
}

fn or_label(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Accept `true`, `"yes"`, `"1"`, `1` and friends
fn deserialize_boolish<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => {
            matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y")
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn filled() -> RelapseFeatures {
        RelapseFeatures {
            age: 25.0,
            age_of_onset: 15.0,
            pulling_severity: 7.0,
            pulling_frequency: "Every day".to_string(),
            pulling_awareness: "Sometimes".to_string(),
            emotion: "Stressed".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_form_is_trivial() {
        assert!(RelapseFeatures::default().is_trivial());

        let blank: RelapseFeatures = serde_json::from_str("{}").unwrap();
        assert!(blank.is_trivial());

        let spaced: RelapseFeatures = serde_json::from_str(
            r#"{"pulling_frequency": " ", "pulling_awareness": "Unknown", "emotion": "NEUTRAL"}"#,
        )
        .unwrap();
        assert!(spaced.is_trivial());
    }

    #[test]
    fn test_any_real_answer_makes_form_non_trivial() {
        assert!(!filled().is_trivial());

        let only_emotion = RelapseFeatures {
            emotion: "anxious".to_string(),
            ..Default::default()
        };
        assert!(!only_emotion.is_trivial());

        let only_urges = RelapseFeatures {
            avg_urge_7d: 3.5,
            ..Default::default()
        };
        assert!(!only_urges.is_trivial());
    }

    #[test]
    fn test_prepared_canonicalises_answers() {
        let prepared = filled().prepared();
        assert_eq!(prepared.pulling_frequency, "daily");
        assert_eq!(prepared.pulling_awareness, "sometimes");
        assert_eq!(prepared.emotion, "stressed");
        assert_eq!(prepared.years_since_onset, Some(10.0));
    }

    #[test]
    fn test_frequency_normalisation() {
        assert_eq!(normalize_frequency("Several times a WEEK"), "several times a week");
        assert_eq!(normalize_frequency("once a week"), "weekly");
        assert_eq!(normalize_frequency("a few times a month"), "monthly");
        assert_eq!(normalize_frequency("Rarely"), "rarely");
        assert_eq!(normalize_frequency("  constantly  "), "constantly");
        assert_eq!(normalize_frequency(""), "");
    }

    #[test]
    fn test_validate_ranges() {
        assert!(filled().validate().is_ok());

        let too_severe = RelapseFeatures {
            pulling_severity: 11.0,
            ..filled()
        };
        assert!(matches!(too_severe.validate(), Err(EngineError::Validation(_))));

        let negative = RelapseFeatures {
            avg_sleep_7d: -1.0,
            ..filled()
        };
        assert!(negative.validate().is_err());

        let nan = RelapseFeatures {
            age: f64::NAN,
            ..filled()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_boolish_successfully_stopped() {
        let yes: RelapseFeatures = serde_json::from_str(r#"{"successfully_stopped": "Yes"}"#).unwrap();
        let one: RelapseFeatures = serde_json::from_str(r#"{"successfully_stopped": 1}"#).unwrap();
        let no: RelapseFeatures = serde_json::from_str(r#"{"successfully_stopped": "nah"}"#).unwrap();
        assert!(yes.successfully_stopped);
        assert!(one.successfully_stopped);
        assert!(!no.successfully_stopped);
    }
}
