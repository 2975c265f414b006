//! Signed-request guard.
//!
//! Decides whether a request is authentic (signature matches its
//! canonical parameters), fresh (timestamp inside the validity window) and
//! not a replay (signature hash unseen within the window).

mod canonical;
mod clock;
mod gate;
mod replay;
mod signature;

pub use canonical::{natural_cmp, CanonicalPayload, Canonicalizer, PhpJsonFormatter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{
    GateOutcome, Rejection, RequestGate, DEFAULT_REQUIRED_FIELDS, DEFAULT_VALIDITY_WINDOW_SECS,
    TIMESTAMP_FIELD,
};
pub use replay::{MemoryReplayStore, ReplayStore};
pub use signature::{SignatureScheme, SignatureVerifier, Verification};
