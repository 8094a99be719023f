//! Data models for jnext.
//!
//! This module contains the value types that flow between pipeline stages.

mod artifact;
mod response;
mod stage;
mod utterance;

pub use artifact::{ARTIFACT_ID_FORMAT, ArtifactId, ArtifactIdGenerator, CapturedArtifact};
pub use response::{
    DEGRADED_ANSWER, Evidence, FAN_OUT_ANSWER, FanOutResult, Provenance, StructuredResponse,
};
pub use stage::Stage;
pub use utterance::{ExchangeId, Role, Utterance};
