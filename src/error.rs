use thiserror::Error;

/// Represents a result type for operations in the Stratum SDK.
///
/// This `Result` type is a standard Rust `Result` type where the error variant
/// is defined by the stratum-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the Stratum SDK.
///
/// Everything here signals misconfiguration by the SDK consumer. Runtime
/// conditions that deny a variation (non-running experiment, failed audience,
/// traffic-allocation miss, profile-service faults) are not errors; they
/// surface as an `Ok(None)` decision plus a diagnostic log entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The experiment key is not present in the current configuration.
    #[error("experiment \"{0}\" is not in the datafile")]
    UnknownExperiment(String),

    /// The variation key passed to
    /// [`set_forced_variation`](crate::DecisionService::set_forced_variation)
    /// does not name a variation of the experiment.
    #[error("variation \"{variation_key}\" is not in experiment \"{experiment_key}\"")]
    UnknownVariation {
        experiment_key: String,
        variation_key: String,
    },
}
