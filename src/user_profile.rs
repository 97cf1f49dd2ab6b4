use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Error type external profile services may fail with.
///
/// The engine never inspects it beyond logging, so any error works.
pub type ProfileServiceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Externally supplied persistent cache of per-user decisions.
///
/// Implementations own durability, consistency, and cleanup entirely; the
/// engine only calls `lookup` before bucketing and `save` after. Concurrent
/// decisions for the same user may interleave lookup/save round-trips
/// (last-writer-wins); serializing them, if desired, is the implementation's
/// job.
pub trait UserProfileService {
    /// Fetch the stored profile for the user, if any.
    fn lookup(&self, user_id: &str) -> Result<Option<UserProfile>, ProfileServiceError>;

    /// Persist the profile, overwriting any stored version.
    fn save(&self, profile: &UserProfile) -> Result<(), ProfileServiceError>;
}

/// Sticky-bucketing record for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    /// Experiment id -> decision made for that experiment.
    #[serde(default)]
    pub experiment_bucket_map: HashMap<String, ExperimentBucket>,
}

impl UserProfile {
    /// An empty profile for the user.
    pub fn new(user_id: impl Into<String>) -> UserProfile {
        UserProfile {
            user_id: user_id.into(),
            experiment_bucket_map: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentBucket {
    pub variation_id: String,
}

/// Outcome of a profile lookup through the adapter.
///
/// `Fault` is distinct from `Missing` on purpose: a failed read means the
/// stored state is unknown, so the decision must not be written back at the
/// end of the call (a blind save would clobber entries the read never saw).
#[derive(Debug)]
pub enum ProfileLookup {
    Found(UserProfile),
    Missing,
    Fault,
}

/// Wraps the externally supplied [`UserProfileService`] and isolates the
/// engine from its failures.
///
/// Any error raised by the underlying service is caught here, logged as an
/// error-severity diagnostic, and converted into a neutral outcome: lookups
/// behave as if nothing was stored, saves as if they silently succeeded. A
/// decision in progress is never aborted by its cache.
pub struct ProfileAdapter {
    service: Option<Box<dyn UserProfileService + Send + Sync>>,
}

impl ProfileAdapter {
    pub fn new(service: Option<Box<dyn UserProfileService + Send + Sync>>) -> ProfileAdapter {
        ProfileAdapter { service }
    }

    /// Whether a profile service is configured at all.
    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    /// Look up the stored profile for a user. Never fails; see
    /// [`ProfileLookup`] for how service errors are reported.
    pub fn lookup(&self, user_id: &str) -> ProfileLookup {
        let Some(service) = &self.service else {
            return ProfileLookup::Missing;
        };
        match service.lookup(user_id) {
            Ok(Some(profile)) => ProfileLookup::Found(profile),
            Ok(None) => ProfileLookup::Missing,
            Err(error) => {
                log::error!(target: "stratum",
                    user_id,
                    operation = "lookup";
                    "Error looking up user profile for user \"{user_id}\": {error}");
                ProfileLookup::Fault
            }
        }
    }

    /// Persist a profile. A service failure is logged and swallowed; the
    /// already-computed decision the profile records is unaffected.
    pub fn save(&self, profile: &UserProfile) {
        let Some(service) = &self.service else {
            return;
        };
        if let Err(error) = service.save(profile) {
            let user_id = profile.user_id.as_str();
            log::error!(target: "stratum",
                user_id,
                operation = "save";
                "Error saving user profile for user \"{user_id}\": {error}");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use super::{ProfileServiceError, UserProfile, UserProfileService};

    /// In-memory profile service that counts calls and can be told to fail
    /// either operation.
    #[derive(Default)]
    pub(crate) struct InMemoryProfiles {
        pub profiles: Mutex<HashMap<String, UserProfile>>,
        pub fail_lookup: AtomicBool,
        pub fail_save: AtomicBool,
        pub lookups: AtomicUsize,
        pub saves: AtomicUsize,
    }

    impl InMemoryProfiles {
        pub fn empty() -> InMemoryProfiles {
            InMemoryProfiles::default()
        }

        pub fn with_profile(profile: UserProfile) -> InMemoryProfiles {
            let service = InMemoryProfiles::empty();
            service
                .profiles
                .lock()
                .unwrap()
                .insert(profile.user_id.clone(), profile);
            service
        }

        pub fn failing() -> InMemoryProfiles {
            let service = InMemoryProfiles::empty();
            service.fail_lookup.store(true, Ordering::Relaxed);
            service.fail_save.store(true, Ordering::Relaxed);
            service
        }

        pub fn stored(&self, user_id: &str) -> Option<UserProfile> {
            self.profiles.lock().unwrap().get(user_id).cloned()
        }

        pub fn lookup_count(&self) -> usize {
            self.lookups.load(Ordering::Relaxed)
        }

        pub fn save_count(&self) -> usize {
            self.saves.load(Ordering::Relaxed)
        }
    }

    impl UserProfileService for InMemoryProfiles {
        fn lookup(&self, user_id: &str) -> Result<Option<UserProfile>, ProfileServiceError> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            if self.fail_lookup.load(Ordering::Relaxed) {
                return Err("storage offline".into());
            }
            Ok(self.stored(user_id))
        }

        fn save(&self, profile: &UserProfile) -> Result<(), ProfileServiceError> {
            self.saves.fetch_add(1, Ordering::Relaxed);
            if self.fail_save.load(Ordering::Relaxed) {
                return Err("storage offline".into());
            }
            self.profiles
                .lock()
                .unwrap()
                .insert(profile.user_id.clone(), profile.clone());
            Ok(())
        }
    }

    // Decision tests hold a second handle onto the service to inspect what
    // was stored after the service has been boxed away.
    impl UserProfileService for Arc<InMemoryProfiles> {
        fn lookup(&self, user_id: &str) -> Result<Option<UserProfile>, ProfileServiceError> {
            self.as_ref().lookup(user_id)
        }

        fn save(&self, profile: &UserProfile) -> Result<(), ProfileServiceError> {
            self.as_ref().save(profile)
        }
    }
}
