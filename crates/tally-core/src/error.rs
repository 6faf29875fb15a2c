use thiserror::Error;

/// Why an inbound beacon batch was rejected before anything was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("Malformed JSON payload.")]
    InvalidJson,
    #[error("Invalid event payload.")]
    InvalidPayload,
    #[error("Invalid batch size: {len} events (max {max}).")]
    BatchSize { len: usize, max: usize },
    #[error("Tracking ID is required.")]
    MissingTrackingId,
    #[error("Mixed tracking IDs are not allowed.")]
    MixedTrackingIds,
    #[error("Event type is required.")]
    MissingEventType,
    #[error("Session ID is required.")]
    MissingSessionId,
    #[error("Page data is required.")]
    MissingPage,
}

impl MalformedReason {
    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson => "malformed_json",
            Self::InvalidPayload => "invalid_payload",
            Self::BatchSize { .. } => "invalid_batch_size",
            Self::MissingTrackingId => "missing_tracking_id",
            Self::MixedTrackingIds => "mixed_tracking_ids",
            Self::MissingEventType => "missing_event_type",
            Self::MissingSessionId => "missing_session_id",
            Self::MissingPage => "missing_page",
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed input: {0}")]
    Malformed(#[from] MalformedReason),

    #[error("payload exceeds {max} bytes")]
    PayloadTooLarge { max: usize },

    #[error("unknown tracking id")]
    UnknownTenant,

    #[error("rate limited")]
    RateLimited,

    #[error("write failure: {0}")]
    WriteFailure(anyhow::Error),
}
