//! Core types shared across the affinity stage

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// A single user interaction with a category value.
///
/// Field names follow the upstream interaction table
/// (`Interaction_ID,User_ID,Category_Type,Category_Value,Strength,Timestamp`).
/// `user_id`, `category_value` and `strength` are optional because loaded
/// tables can carry blanks; the aggregator drops such records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    #[serde(rename = "Interaction_ID", default)]
    pub interaction_id: Option<String>,

    #[serde(rename = "User_ID")]
    pub user_id: Option<String>,

    #[serde(rename = "Category_Type")]
    pub category_type: String,

    #[serde(rename = "Category_Value")]
    pub category_value: Option<String>,

    /// Interaction strength, typically in `[1, 5]`
    #[serde(rename = "Strength", deserialize_with = "csv::invalid_option", default)]
    pub strength: Option<f64>,

    #[serde(rename = "Timestamp", deserialize_with = "deserialize_timestamp", default)]
    pub timestamp: Option<NaiveDateTime>,
}

impl InteractionRecord {
    pub fn new(
        user_id: impl Into<String>,
        category_type: impl Into<String>,
        category_value: impl Into<String>,
        strength: f64,
    ) -> Self {
        Self {
            interaction_id: None,
            user_id: Some(user_id.into()),
            category_type: category_type.into(),
            category_value: Some(category_value.into()),
            strength: Some(strength),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns `(user_id, category_value, strength)` when the record is usable
    /// for aggregation.
    pub fn usable_parts(&self) -> Option<(&str, &str, f64)> {
        let user_id = self.user_id.as_deref().filter(|s| !s.is_empty())?;
        let category_value = self.category_value.as_deref().filter(|s| !s.is_empty())?;
        let strength = self.strength.filter(|s| s.is_finite())?;
        Some((user_id, category_value, strength))
    }
}

/// Parse the timestamp layouts seen in interaction exports.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", value))),
    }
}
