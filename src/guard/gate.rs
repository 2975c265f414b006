//! The request gate: presence, integrity, freshness and uniqueness.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{Canonicalizer, Clock, ReplayStore, SignatureVerifier};

/// Name of the request timestamp field.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Default validity window for signatures and replay keys.
pub const DEFAULT_VALIDITY_WINDOW_SECS: u64 = 500;

/// Fields that must be present before any hashing happens.
pub const DEFAULT_REQUIRED_FIELDS: [&str; 4] = ["timestamp", "token", "signature", "nonce"];

/// Why the gate refused a request.
///
/// The numeric codes are part of the wire contract with API consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    MissingParameters,
    ParameterTampering,
    RequestExpired,
    DuplicateSubmission,
}

impl Rejection {
    /// Machine-readable code sent in the response envelope.
    pub const fn code(self) -> i64 {
        match self {
            Self::MissingParameters => 503,
            Self::ParameterTampering => 504,
            Self::RequestExpired => 505,
            Self::DuplicateSubmission => 555,
        }
    }

    /// Client-facing message.
    pub const fn message(self) -> &'static str {
        match self {
            Self::MissingParameters => "Missing required parameters",
            Self::ParameterTampering => "Parameter tampering detected",
            Self::RequestExpired => "Request expired",
            Self::DuplicateSubmission => "Duplicate submission",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// Decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Accepted,
    Rejected(Rejection),
}

impl GateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Runs the integrity, freshness and replay checks for a parameter bag.
///
/// Checks run in a fixed order and stop at the first failure:
/// 1. every required field is present and non-empty,
/// 2. the supplied signature matches the one computed over the canonical
///    payload,
/// 3. `timestamp >= now - window` (timestamps in the future pass),
/// 4. the computed signature has not been seen within the window.
pub struct RequestGate {
    canonicalizer: Canonicalizer,
    verifier: SignatureVerifier,
    replay: Arc<dyn ReplayStore>,
    clock: Arc<dyn Clock>,
    required_fields: Vec<String>,
    validity_window_secs: u64,
}

impl RequestGate {
    /// Create a gate with the default field names and a 500 second window.
    pub fn new(
        verifier: SignatureVerifier,
        replay: Arc<dyn ReplayStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            canonicalizer: Canonicalizer::default(),
            verifier,
            replay,
            clock,
            required_fields: DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            validity_window_secs: DEFAULT_VALIDITY_WINDOW_SECS,
        }
    }

    /// Use a different signature field name.
    pub fn with_signature_field(mut self, field: impl Into<String>) -> Self {
        self.canonicalizer = Canonicalizer::new(field);
        self
    }

    /// Replace the list of required fields.
    pub fn with_required_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the validity window in seconds.
    pub fn with_validity_window(mut self, secs: u64) -> Self {
        self.validity_window_secs = secs;
        self
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    pub fn validity_window_secs(&self) -> u64 {
        self.validity_window_secs
    }

    /// Evaluate a request's parameters.
    pub fn evaluate(&self, params: &Map<String, Value>) -> GateOutcome {
        if let Some(field) = self
            .required_fields
            .iter()
            .find(|field| !params.get(field.as_str()).is_some_and(is_present))
        {
            debug!(field = %field, "Required field missing");
            return GateOutcome::Rejected(Rejection::MissingParameters);
        }

        let payload = match self.canonicalizer.canonicalize(params) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to canonicalize parameters");
                return GateOutcome::Rejected(Rejection::ParameterTampering);
            }
        };

        let supplied = params
            .get(self.canonicalizer.signature_field())
            .map(text_of)
            .unwrap_or_default();
        let verification = self.verifier.verify(&payload, &supplied);
        if !verification.matched {
            debug!(computed = %verification.computed, "Signature mismatch");
            return GateOutcome::Rejected(Rejection::ParameterTampering);
        }

        let now = i64::try_from(self.clock.now_secs()).unwrap_or(i64::MAX);
        let window = i64::try_from(self.validity_window_secs).unwrap_or(i64::MAX);
        let fresh = params
            .get(TIMESTAMP_FIELD)
            .and_then(parse_timestamp)
            .is_some_and(|timestamp| timestamp >= now.saturating_sub(window));
        if !fresh {
            return GateOutcome::Rejected(Rejection::RequestExpired);
        }

        let ttl = Duration::from_secs(self.validity_window_secs);
        if self.replay.check_and_mark(&verification.computed, ttl) {
            return GateOutcome::Rejected(Rejection::DuplicateSubmission);
        }

        GateOutcome::Accepted
    }
}

/// Loose truthiness for parameter values: `null`, `false`, `0`, `""` and
/// `"0"` count as absent, matching what form-encoded clients send for unset
/// fields.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn text_of(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

/// Numeric timestamps may arrive as JSON numbers or numeric strings.
/// Fractional seconds are floored.
fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.floor() as i64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{ManualClock, MemoryReplayStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NOW: u64 = 1_700_000_000;

    struct Harness {
        clock: Arc<ManualClock>,
        gate: RequestGate,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(NOW));
        let replay = Arc::new(MemoryReplayStore::new(clock.clone()));
        let gate = RequestGate::new(SignatureVerifier::md5(), replay, clock.clone());
        Harness { clock, gate }
    }

    fn signed(gate: &RequestGate, mut params: Map<String, Value>) -> Map<String, Value> {
        let payload = gate.canonicalizer().canonicalize(&params).unwrap();
        let signature = gate.verifier().sign(&payload);
        params.insert("signature".to_string(), Value::String(signature));
        params
    }

    fn request(timestamp: u64, nonce: &str) -> Map<String, Value> {
        let Value::Object(map) = json!({
            "timestamp": timestamp.to_string(),
            "token": "token-abc",
            "nonce": nonce,
            "title": "hello",
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn test_valid_request_accepted() {
        let h = harness();
        let params = signed(&h.gate, request(NOW, "n1"));
        assert_eq!(h.gate.evaluate(&params), GateOutcome::Accepted);
    }

    #[test]
    fn test_missing_nonce_rejected_before_hashing() {
        struct CountingStore(AtomicUsize);
        impl ReplayStore for CountingStore {
            fn check_and_mark(&self, _key: &str, _ttl: Duration) -> bool {
                self.0.fetch_add(1, Ordering::SeqCst);
                false
            }
        }

        let store = Arc::new(CountingStore(AtomicUsize::new(0)));
        let gate = RequestGate::new(
            SignatureVerifier::md5(),
            store.clone(),
            Arc::new(ManualClock::new(NOW)),
        );

        let mut params = signed(&gate, request(NOW, "n1"));
        params.remove("nonce");

        assert_eq!(
            gate.evaluate(&params),
            GateOutcome::Rejected(Rejection::MissingParameters)
        );
        assert_eq!(store.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_falsy_values_count_as_missing() {
        let h = harness();
        for empty in [json!(""), json!("0"), json!(null), json!(0)] {
            let mut params = signed(&h.gate, request(NOW, "n1"));
            params.insert("token".to_string(), empty);
            assert_eq!(
                h.gate.evaluate(&params),
                GateOutcome::Rejected(Rejection::MissingParameters)
            );
        }
    }

    #[test]
    fn test_tampered_value_rejected() {
        let h = harness();
        let mut params = signed(&h.gate, request(NOW, "n1"));
        params.insert("title".to_string(), json!("goodbye"));

        assert_eq!(
            h.gate.evaluate(&params),
            GateOutcome::Rejected(Rejection::ParameterTampering)
        );
    }

    #[test]
    fn test_added_parameter_rejected() {
        let h = harness();
        let mut params = signed(&h.gate, request(NOW, "n1"));
        params.insert("admin".to_string(), json!("1"));

        assert_eq!(
            h.gate.evaluate(&params),
            GateOutcome::Rejected(Rejection::ParameterTampering)
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let h = harness();

        let fresh = signed(&h.gate, request(NOW - 499, "n1"));
        assert_eq!(h.gate.evaluate(&fresh), GateOutcome::Accepted);

        let edge = signed(&h.gate, request(NOW - 500, "n2"));
        assert_eq!(h.gate.evaluate(&edge), GateOutcome::Accepted);

        let stale = signed(&h.gate, request(NOW - 501, "n3"));
        assert_eq!(
            h.gate.evaluate(&stale),
            GateOutcome::Rejected(Rejection::RequestExpired)
        );
    }

    #[test]
    fn test_future_timestamp_accepted() {
        let h = harness();
        let params = signed(&h.gate, request(NOW + 86_400, "n1"));
        assert_eq!(h.gate.evaluate(&params), GateOutcome::Accepted);
    }

    #[test]
    fn test_non_numeric_timestamp_is_expired() {
        let h = harness();
        let mut params = request(NOW, "n1");
        params.insert("timestamp".to_string(), json!("yesterday"));
        let params = signed(&h.gate, params);

        assert_eq!(
            h.gate.evaluate(&params),
            GateOutcome::Rejected(Rejection::RequestExpired)
        );
    }

    #[test]
    fn test_replay_rejected_until_window_elapses() {
        let h = harness();
        let params = signed(&h.gate, request(NOW, "n1"));

        assert_eq!(h.gate.evaluate(&params), GateOutcome::Accepted);
        assert_eq!(
            h.gate.evaluate(&params),
            GateOutcome::Rejected(Rejection::DuplicateSubmission)
        );

        h.clock.advance(500);
        assert_eq!(h.gate.evaluate(&params), GateOutcome::Accepted);
    }

    #[test]
    fn test_expired_request_does_not_mark_replay() {
        let h = harness();
        let params = signed(&h.gate, request(NOW - 600, "n1"));

        assert_eq!(
            h.gate.evaluate(&params),
            GateOutcome::Rejected(Rejection::RequestExpired)
        );

        // Bring the same request back into the window: it was never recorded.
        h.clock.set(NOW - 200);
        assert_eq!(h.gate.evaluate(&params), GateOutcome::Accepted);
    }

    #[test]
    fn test_custom_window_and_signature_field() {
        let clock = Arc::new(ManualClock::new(NOW));
        let replay = Arc::new(MemoryReplayStore::new(clock.clone()));
        let gate = RequestGate::new(SignatureVerifier::md5(), replay, clock.clone())
            .with_signature_field("sign")
            .with_required_fields(["timestamp", "token", "sign", "nonce"])
            .with_validity_window(60);

        let mut params = request(NOW - 30, "n1");
        let payload = gate.canonicalizer().canonicalize(&params).unwrap();
        params.insert("sign".to_string(), json!(gate.verifier().sign(&payload)));
        assert_eq!(gate.evaluate(&params), GateOutcome::Accepted);

        let mut stale = request(NOW - 61, "n2");
        let payload = gate.canonicalizer().canonicalize(&stale).unwrap();
        stale.insert("sign".to_string(), json!(gate.verifier().sign(&payload)));
        assert_eq!(
            gate.evaluate(&stale),
            GateOutcome::Rejected(Rejection::RequestExpired)
        );
    }

    #[test]
    fn test_rejection_codes_are_distinct() {
        let codes = [
            Rejection::MissingParameters.code(),
            Rejection::ParameterTampering.code(),
            Rejection::RequestExpired.code(),
            Rejection::DuplicateSubmission.code(),
        ];
        assert_eq!(codes, [503, 504, 505, 555]);
    }
}
