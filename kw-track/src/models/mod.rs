//! Data model for the listing analysis tracker

pub mod analysis_job;
pub mod availability;
pub mod change_event;
pub mod duplicate;

pub use analysis_job::AnalysisJob;
pub use availability::{
    AvailabilityHistory, AvailabilityPeriod, RawAvailabilitySnapshot, RawRoomHistory,
    RoomAvailabilitySummary, RoomStatus,
};
pub use change_event::{ChangeEvent, ChangeKind, PriceDelta, PriceDirection, RoomDelta};
pub use duplicate::{
    DuplicateCandidateSet, MatchCandidate, ProximityLevel, ResolutionDecision, ResolutionOutcome,
};
