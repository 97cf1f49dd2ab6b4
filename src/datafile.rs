use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::audience::Condition;

/// Typed entities of the configuration payload ("datafile").
///
/// Parsing and validating the payload itself is the delivery layer's job; the
/// engine only reads these fully-formed entities. The derives exist so the
/// same types plug directly into that layer.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datafile {
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub audiences: Vec<Audience>,
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing
/// of the whole structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TryParse<T> {
    Parsed(T),
    ParseFailed(serde_json::Value),
}
impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}
impl<'a, T> From<&'a TryParse<T>> for Option<&'a T> {
    fn from(value: &TryParse<T>) -> Option<&T> {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: String,
    pub key: String,
    pub status: ExperimentStatus,
    /// Audience gating entry. `None` means the experiment is open to everyone.
    #[serde(default)]
    pub audience_id: Option<String>,
    /// Cumulative-endpoint table resolving bucket values to variation ids.
    pub traffic_allocation: Vec<TrafficSplit>,
    pub variations: Vec<Variation>,
    /// Whitelist of user id to variation *key*. Keys are literal strings and
    /// are not validated against `variations` upstream.
    #[serde(default)]
    pub forced_variations: HashMap<String, String>,
    /// Set when the experiment is a member of a mutually exclusive group.
    #[serde(default)]
    pub group_id: Option<String>,
}

impl Experiment {
    /// Return `true` if the experiment is running and may bucket users.
    pub fn is_running(&self) -> bool {
        self.status == ExperimentStatus::Running
    }

    pub fn variation_by_id(&self, id: &str) -> Option<&Variation> {
        self.variations.iter().find(|variation| variation.id == id)
    }

    pub fn variation_by_key(&self, key: &str) -> Option<&Variation> {
        self.variations.iter().find(|variation| variation.key == key)
    }

    /// Datafile-declared whitelist entry for the user, if any. Returns the
    /// variation key as written, which may not name an existing variation.
    pub fn whitelisted_variation(&self, user_id: &str) -> Option<&str> {
        self.forced_variations.get(user_id).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentStatus {
    Running,
    Paused,
    NotStarted,
    Launched,
    Archived,
    /// Catch-all for statuses introduced after this SDK version. Anything that
    /// is not `Running` is treated uniformly as not running.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub id: String,
    pub key: String,
}

/// One entry of a traffic-allocation table.
///
/// Endpoints are cumulative and monotonically non-decreasing, the last one at
/// most 10000. `entity_id` is a variation id in experiment-level tables and an
/// experiment id in group-level tables; either way it is not guaranteed to
/// resolve and must be checked at the use site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSplit {
    pub end_of_range: u32,
    pub entity_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub policy: GroupPolicy,
    /// Allocation over member experiment ids.
    pub traffic_allocation: Vec<TrafficSplit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupPolicy {
    /// Members are mutually exclusive: a user lands in at most one of them.
    Random,
    /// Members overlap freely; group membership imposes no exclusion.
    #[serde(other)]
    Overlapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audience {
    pub id: String,
    /// A condition tree that failed to parse is kept as raw JSON and evaluates
    /// to unknown, denying entry without invalidating the configuration.
    pub conditions: TryParse<Condition>,
}

#[cfg(test)]
mod tests {
    use super::{Datafile, ExperimentStatus, TryParse};

    #[test]
    fn parses_experiment_entities() {
        let datafile: Datafile = serde_json::from_str(
            r#"{
              "experiments": [{
                "id": "111127",
                "key": "E1",
                "status": "Running",
                "audienceId": "11154",
                "trafficAllocation": [
                  {"endOfRange": 5000, "entityId": "111128"},
                  {"endOfRange": 10000, "entityId": "111129"}
                ],
                "variations": [
                  {"id": "111128", "key": "control"},
                  {"id": "111129", "key": "variation"}
                ],
                "forcedVariations": {"forced_user1": "control"},
                "groupId": "19228"
              }],
              "groups": [{
                "id": "19228",
                "policy": "random",
                "trafficAllocation": [{"endOfRange": 10000, "entityId": "111127"}]
              }],
              "audiences": [{
                "id": "11154",
                "conditions": {"match": {"name": "browser_type", "value": "safari"}}
              }]
            }"#,
        )
        .unwrap();

        let experiment = &datafile.experiments[0];
        assert!(experiment.is_running());
        assert_eq!(experiment.variation_by_key("control").unwrap().id, "111128");
        assert_eq!(experiment.variation_by_id("111129").unwrap().key, "variation");
        assert_eq!(experiment.whitelisted_variation("forced_user1"), Some("control"));
        assert_eq!(experiment.whitelisted_variation("other_user"), None);
        assert!(matches!(datafile.audiences[0].conditions, TryParse::Parsed(_)));
    }

    #[test]
    fn unrecognized_status_is_not_running() {
        let status: ExperimentStatus = serde_json::from_str(r#""Ramping""#).unwrap();
        assert_eq!(status, ExperimentStatus::Unknown);
    }

    #[test]
    fn malformed_conditions_parse_partially() {
        let audience: super::Audience = serde_json::from_str(
            r#"{"id": "11154", "conditions": {"between": {"low": 1, "high": 10}}}"#,
        )
        .unwrap();
        assert!(matches!(audience.conditions, TryParse::ParseFailed(_)));
    }
}
