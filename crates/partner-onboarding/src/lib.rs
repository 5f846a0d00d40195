//! Verification pipeline and transactional approval engine for onboarding fleet owners and
//! franchise partners.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
