//! The decision engine of the Stratum experimentation and feature-flagging SDK.
//!
//! # Overview
//!
//! The engine revolves around a [`DecisionService`] that, given a user id, an
//! experiment key, and optional user [`Attributes`], deterministically decides
//! which variation (if any) the user is assigned to. Decisions are
//! reproducible across processes and across SDK implementations in other
//! languages: the same inputs always produce the same variation.
//!
//! A decision consults, in fixed precedence order: the experiment's running
//! state, forced/whitelisted variations, a previously persisted ("sticky")
//! decision from a pluggable [`UserProfileService`], the experiment's audience
//! conditions, and finally deterministic hash-based bucketing (honoring
//! mutually exclusive groups). Each step short-circuits the rest.
//!
//! The engine reads experiments, groups, and audiences from a
//! [`Configuration`], an indexed, immutable view over the parsed datafile.
//! Fetching and parsing the datafile is the delivery layer's concern;
//! [`ConfigurationStore`](configuration_store::ConfigurationStore) is the
//! hand-off point between that layer and concurrent decisions.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Only consumer
//! misconfiguration (an unknown experiment key, an invalid forced variation)
//! is an error. Runtime conditions that deny an assignment, such as a paused
//! experiment, a failed audience check, a traffic-allocation miss, or a
//! profile store outage, all return `Ok(None)` and leave a diagnostic in the
//! log.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for
//! logging messages, with one structured `info` event per decision outcome and
//! `error` events for profile-service failures. Consider integrating a
//! `log`-compatible logger implementation for better visibility into decision
//! reasons.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod bucketer;
pub mod configuration_store;
pub mod datafile;

mod attributes;
mod audience;
mod configuration;
mod decision;
mod error;
mod user_profile;

pub use attributes::{AttributeValue, Attributes};
pub use audience::{Condition, Ternary};
pub use configuration::Configuration;
pub use decision::DecisionService;
pub use error::{Error, Result};
pub use user_profile::{
    ExperimentBucket, ProfileAdapter, ProfileLookup, ProfileServiceError, UserProfile,
    UserProfileService,
};
