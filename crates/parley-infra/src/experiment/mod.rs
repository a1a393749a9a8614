//! Experiment bucketing backends.

pub mod posthog;

pub use posthog::PosthogBucketing;
