use std::collections::HashMap;

use crate::{
    audience::Condition,
    datafile::{Datafile, Experiment, Group, TryParse},
};

/// Read-only indexed view over the parsed datafile.
///
/// The configuration is immutable after construction and shared across
/// concurrent decisions; see
/// [`ConfigurationStore`](crate::configuration_store::ConfigurationStore) for
/// hot-swapping whole snapshots.
#[derive(Debug)]
pub struct Configuration {
    experiments: Vec<Experiment>,
    /// Experiment id -> index into `experiments`.
    ids: HashMap<String, usize>,
    /// Experiment key -> index into `experiments`.
    keys: HashMap<String, usize>,
    groups: HashMap<String, Group>,
    audiences: HashMap<String, TryParse<Condition>>,
}

impl Configuration {
    /// Index a deserialized datafile for keyed access.
    ///
    /// Later duplicates of an experiment id or key win, matching the
    /// last-write behavior of map-shaped payloads.
    pub fn from_datafile(datafile: Datafile) -> Configuration {
        let mut ids = HashMap::with_capacity(datafile.experiments.len());
        let mut keys = HashMap::with_capacity(datafile.experiments.len());
        for (index, experiment) in datafile.experiments.iter().enumerate() {
            ids.insert(experiment.id.clone(), index);
            keys.insert(experiment.key.clone(), index);
        }

        Configuration {
            experiments: datafile.experiments,
            ids,
            keys,
            groups: datafile
                .groups
                .into_iter()
                .map(|group| (group.id.clone(), group))
                .collect(),
            audiences: datafile
                .audiences
                .into_iter()
                .map(|audience| (audience.id, audience.conditions))
                .collect(),
        }
    }

    pub fn experiment_by_key(&self, key: &str) -> Option<&Experiment> {
        self.keys.get(key).map(|&index| &self.experiments[index])
    }

    pub fn experiment_by_id(&self, id: &str) -> Option<&Experiment> {
        self.ids.get(id).map(|&index| &self.experiments[index])
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    /// Condition tree of the given audience. The outer `Option` is a dangling
    /// reference; the inner [`TryParse`] is a tree that failed to parse.
    pub fn audience(&self, id: &str) -> Option<&TryParse<Condition>> {
        self.audiences.get(id)
    }

    /// Keys of all experiments in the configuration, in datafile order.
    pub fn experiment_keys(&self) -> impl Iterator<Item = &str> {
        self.experiments.iter().map(|experiment| experiment.key.as_str())
    }
}
