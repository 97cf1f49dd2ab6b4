use std::{collections::HashMap, sync::RwLock};

use crate::{
    audience::Ternary,
    bucketer::{bucket, Bucketer, MurmurBucketer},
    datafile::{Experiment, GroupPolicy, TryParse},
    user_profile::{
        ExperimentBucket, ProfileAdapter, ProfileLookup, UserProfile, UserProfileService,
    },
    Attributes, Configuration, Error, Result,
};

/// Decides which variation (if any) a user is assigned to.
///
/// The service itself is almost stateless: the only state it owns is the
/// direct-API forced-variation table. The configuration is passed per call,
/// so concurrent decisions always see one consistent snapshot, and the
/// profile cache round-trip is self-contained within each call.
///
/// # Examples
/// ```
/// # use stratum::{Configuration, DecisionService};
/// # use stratum::datafile::Datafile;
/// let configuration = Configuration::from_datafile(Datafile {
///     experiments: vec![],
///     groups: vec![],
///     audiences: vec![],
/// });
/// let decisions = DecisionService::new(None);
/// assert!(decisions.get_variation(&configuration, "checkout_test", "user-1", None).is_err());
/// ```
pub struct DecisionService<B = MurmurBucketer> {
    bucketer: B,
    profiles: ProfileAdapter,
    /// Direct-API overrides: experiment id -> user id -> variation key.
    /// Independent of the datafile's own whitelists and scoped to this
    /// instance's lifetime.
    forced_variations: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl DecisionService {
    /// Create a decision service with the default murmur bucketer.
    ///
    /// Pass `None` for the profile service to disable sticky bucketing.
    pub fn new(
        profile_service: Option<Box<dyn UserProfileService + Send + Sync>>,
    ) -> DecisionService {
        DecisionService::with_bucketer(MurmurBucketer, profile_service)
    }
}

impl<B: Bucketer> DecisionService<B> {
    /// Create a decision service with a custom [`Bucketer`].
    pub fn with_bucketer(
        bucketer: B,
        profile_service: Option<Box<dyn UserProfileService + Send + Sync>>,
    ) -> DecisionService<B> {
        DecisionService {
            bucketer,
            profiles: ProfileAdapter::new(profile_service),
            forced_variations: RwLock::new(HashMap::new()),
        }
    }

    /// Decide the variation of `experiment_key` for `user_id`.
    ///
    /// Returns the variation id, or `None` when the user is not assigned one
    /// (experiment not running, audience mismatch, traffic-allocation miss,
    /// group exclusion). Checks run in fixed precedence order, each
    /// short-circuiting the rest: running state, forced/whitelisted
    /// variation, sticky decision from the user profile, audience, then
    /// deterministic bucketing. A fresh bucketing decision is persisted back
    /// to the profile service.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownExperiment`] if the key is not in the configuration.
    pub fn get_variation(
        &self,
        configuration: &Configuration,
        experiment_key: &str,
        user_id: &str,
        attributes: Option<&Attributes>,
    ) -> Result<Option<String>> {
        let experiment = configuration
            .experiment_by_key(experiment_key)
            .ok_or_else(|| Error::UnknownExperiment(experiment_key.to_owned()))?;

        if !experiment.is_running() {
            log::info!(target: "stratum",
                user_id,
                experiment_key;
                "Experiment \"{experiment_key}\" is not running.");
            return Ok(None);
        }

        // Direct-API overrides win over the datafile whitelist; both resolve
        // through the same staleness handling.
        let override_key = self
            .forced_variation_key(&experiment.id, user_id)
            .or_else(|| experiment.whitelisted_variation(user_id).map(str::to_owned));
        if let Some(variation_key) = override_key {
            match experiment.variation_by_key(&variation_key) {
                Some(variation) => {
                    log::info!(target: "stratum",
                        user_id,
                        experiment_key,
                        variation_key;
                        "User \"{user_id}\" is whitelisted into variation \"{variation_key}\" of experiment \"{experiment_key}\".");
                    return Ok(Some(variation.id.clone()));
                }
                None => {
                    // The stale entry is kept and re-detected on every call;
                    // the user buckets normally below.
                    log::info!(target: "stratum",
                        user_id,
                        experiment_key,
                        variation_key;
                        "User \"{user_id}\" is whitelisted into variation \"{variation_key}\", which is not in the datafile.");
                }
            }
        }

        let (profile, save_allowed) = match self.profiles.lookup(user_id) {
            ProfileLookup::Found(profile) => (Some(profile), true),
            ProfileLookup::Missing => (None, self.profiles.is_enabled()),
            // The stored state is unknown; writing the new decision back
            // could clobber entries the failed read never saw.
            ProfileLookup::Fault => (None, false),
        };

        if let Some(profile) = &profile {
            if let Some(sticky) = profile.experiment_bucket_map.get(&experiment.id) {
                match experiment.variation_by_id(&sticky.variation_id) {
                    Some(variation) => {
                        let variation_key = variation.key.as_str();
                        log::info!(target: "stratum",
                            user_id,
                            experiment_key,
                            variation_key;
                            "Returning previously activated variation \"{variation_key}\" of experiment \"{experiment_key}\" for user \"{user_id}\" from user profile.");
                        return Ok(Some(variation.id.clone()));
                    }
                    None => {
                        log::trace!(target: "stratum",
                            user_id,
                            experiment_key,
                            stale_variation_id = sticky.variation_id.as_str();
                            "stored variation is no longer in the experiment, re-bucketing");
                    }
                }
            }
        }

        let empty_attributes = Attributes::new();
        let attributes = attributes.unwrap_or(&empty_attributes);
        if audience_allows(configuration, experiment, attributes) != Ternary::True {
            log::info!(target: "stratum",
                user_id,
                experiment_key;
                "User \"{user_id}\" does not meet the conditions to be in experiment \"{experiment_key}\".");
            return Ok(None);
        }

        // Mutually exclusive grouping routes the user to at most one member
        // experiment before any experiment-level bucketing happens.
        if let Some(group) = experiment
            .group_id
            .as_deref()
            .and_then(|group_id| configuration.group(group_id))
        {
            if group.policy == GroupPolicy::Random {
                let routed = bucket(&self.bucketer, user_id, &group.id, &group.traffic_allocation);
                if routed != Some(experiment.id.as_str()) {
                    let group_id = group.id.as_str();
                    log::info!(target: "stratum",
                        user_id,
                        experiment_key,
                        group_id;
                        "User \"{user_id}\" is not in experiment \"{experiment_key}\" of group {group_id}.");
                    return Ok(None);
                }
            }
        }

        // Allocation entries may reference variations that were since removed
        // from the experiment, so the result is resolved, not trusted.
        let variation = bucket(
            &self.bucketer,
            user_id,
            &experiment.id,
            &experiment.traffic_allocation,
        )
        .and_then(|variation_id| experiment.variation_by_id(variation_id));
        let Some(variation) = variation else {
            log::info!(target: "stratum",
                user_id,
                experiment_key;
                "User \"{user_id}\" is in no variation.");
            return Ok(None);
        };

        let variation_key = variation.key.as_str();
        log::info!(target: "stratum",
            user_id,
            experiment_key,
            variation_key;
            "User \"{user_id}\" is in variation \"{variation_key}\" of experiment \"{experiment_key}\".");

        if save_allowed {
            let mut profile = profile.unwrap_or_else(|| UserProfile::new(user_id));
            profile.experiment_bucket_map.insert(
                experiment.id.clone(),
                ExperimentBucket {
                    variation_id: variation.id.clone(),
                },
            );
            self.profiles.save(&profile);
        }

        Ok(Some(variation.id.clone()))
    }

    /// Force `user_id` into the variation named by `variation_key` for the
    /// given experiment, or clear the override with `None`.
    ///
    /// The override takes priority over the datafile's own whitelist and
    /// bypasses sticky bucketing, audience checks, and bucketing on later
    /// [`get_variation`](DecisionService::get_variation) calls. It is scoped
    /// to this service instance and never persisted.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownExperiment`] if the experiment key is not in the
    /// configuration; [`Error::UnknownVariation`] if the variation key does
    /// not name a variation of the experiment.
    pub fn set_forced_variation(
        &self,
        configuration: &Configuration,
        experiment_key: &str,
        user_id: &str,
        variation_key: Option<&str>,
    ) -> Result<()> {
        let experiment = configuration
            .experiment_by_key(experiment_key)
            .ok_or_else(|| Error::UnknownExperiment(experiment_key.to_owned()))?;

        match variation_key {
            Some(variation_key) => {
                if experiment.variation_by_key(variation_key).is_none() {
                    return Err(Error::UnknownVariation {
                        experiment_key: experiment_key.to_owned(),
                        variation_key: variation_key.to_owned(),
                    });
                }
                let mut overrides = self
                    .forced_variations
                    .write()
                    .expect("thread holding forced-variation lock should not panic");
                overrides
                    .entry(experiment.id.clone())
                    .or_default()
                    .insert(user_id.to_owned(), variation_key.to_owned());
            }
            None => {
                let mut overrides = self
                    .forced_variations
                    .write()
                    .expect("thread holding forced-variation lock should not panic");
                if let Some(users) = overrides.get_mut(&experiment.id) {
                    users.remove(user_id);
                }
            }
        }
        Ok(())
    }

    /// The variation key previously set via
    /// [`set_forced_variation`](DecisionService::set_forced_variation), if
    /// any.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownExperiment`] if the experiment key is not in the
    /// configuration.
    pub fn get_forced_variation(
        &self,
        configuration: &Configuration,
        experiment_key: &str,
        user_id: &str,
    ) -> Result<Option<String>> {
        let experiment = configuration
            .experiment_by_key(experiment_key)
            .ok_or_else(|| Error::UnknownExperiment(experiment_key.to_owned()))?;

        Ok(self.forced_variation_key(&experiment.id, user_id))
    }

    fn forced_variation_key(&self, experiment_id: &str, user_id: &str) -> Option<String> {
        self.forced_variations
            .read()
            .expect("thread holding forced-variation lock should not panic")
            .get(experiment_id)
            .and_then(|users| users.get(user_id))
            .cloned()
    }
}

/// Evaluate the experiment's audience requirement.
///
/// No requirement is vacuously true. A dangling audience reference and a
/// condition tree that failed to parse both evaluate to unknown, which denies
/// entry without being an error.
fn audience_allows(
    configuration: &Configuration,
    experiment: &Experiment,
    attributes: &Attributes,
) -> Ternary {
    let Some(audience_id) = &experiment.audience_id else {
        return Ternary::True;
    };
    match configuration.audience(audience_id) {
        Some(TryParse::Parsed(conditions)) => conditions.eval(attributes),
        Some(TryParse::ParseFailed(_)) | None => Ternary::Unknown,
    }
}
