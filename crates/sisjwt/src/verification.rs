//! The verification policy.
//!
//! A [`VerificationResult`] wraps a decoded token (or the reason decoding
//! failed) and decides whether to accept it. The caller adds the issuers and
//! audiences it trusts; every change to those lists re-runs the policy, so
//! [`is_valid`](VerificationResult::is_valid) and
//! [`errors`](VerificationResult::errors) always describe the current lists.
//!
//! # Policy
//!
//! 1. A decode error is reported first. If the token had no readable header
//!    or payload at all, nothing else is checked.
//! 2. Tokens older than [`MAX_ALLOWED_AGE`] are rejected, whatever their `exp`.
//! 3. Expired tokens are rejected. A missing `exp` counts as expired.
//! 4. `iss` must be on the allowed issuer list (ASCII case-insensitive).
//! 5. `aud` must be on the allowed audience list (ASCII case-insensitive).
//! 6. With a non-empty [`ArnInventory`], the header `kid` must be registered to
//!    the token's issuer.

use std::{fmt, sync::Arc};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{
    arn_inventory::ArnInventory,
    clock::{Clock, SystemClock},
    codec::Claims,
    headers::Headers,
    runtime::Runtime,
    validation::ValidationErrors,
};

/// Maximum accepted token age in seconds, regardless of `exp`.
pub const MAX_ALLOWED_AGE: i64 = 3_600;

/// Outcome of verifying one token.
///
/// Owned by the call that produced it; mutate from one thread at a time.
#[derive(Clone)]
pub struct VerificationResult {
    headers: Headers,
    payload: Claims,
    decode_error: Option<String>,
    issued_at: i64,
    expires_at: i64,
    allowed_issuers: Vec<String>,
    allowed_audiences: Vec<String>,
    arn_inventory: Option<Arc<ArnInventory>>,
    runtime: Runtime,
    clock: Arc<dyn Clock>,
    evaluated_at: i64,
    errors: ValidationErrors,
}

impl fmt::Debug for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationResult")
            .field("headers", &self.headers)
            .field("payload", &self.payload)
            .field("decode_error", &self.decode_error)
            .field("allowed_issuers", &self.allowed_issuers)
            .field("allowed_audiences", &self.allowed_audiences)
            .field("valid", &self.is_valid())
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl VerificationResult {
    /// Builds a result and runs the policy with empty allow-lists.
    ///
    /// # Example
    ///
    /// ```
    /// use serde_json::json;
    /// use sisjwt::{FixedClock, Runtime, VerificationResult};
    ///
    /// let clock = FixedClock::new(1_700_000_000);
    /// let payload = json!({"iss": "SISi", "aud": "SISa", "iat": 1_700_000_000, "exp": 1_700_000_060});
    ///
    /// let mut result = VerificationResult::builder()
    ///     .payload(payload.as_object().cloned().unwrap_or_default())
    ///     .runtime(Runtime::development())
    ///     .clock(std::sync::Arc::new(clock))
    ///     .build();
    /// assert!(!result.is_valid());
    ///
    /// result.add_allowed_issuer("SISi");
    /// result.add_allowed_audience("SISa");
    /// assert!(result.is_valid());
    /// ```
    #[builder]
    pub fn new(
        #[builder(default)] headers: Headers,
        #[builder(default)] payload: Claims,
        #[builder(into)] decode_error: Option<String>,
        arn_inventory: Option<Arc<ArnInventory>>,
        runtime: Option<Runtime>,
        clock: Option<Arc<dyn Clock>>,
    ) -> Self {
        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock));
        let now = clock.now();
        let issued_at = numeric_claim(&payload, "iat").unwrap_or(now);
        let expires_at = numeric_claim(&payload, "exp").unwrap_or(now.saturating_sub(1));

        let mut result = Self {
            headers,
            payload,
            decode_error,
            issued_at,
            expires_at,
            allowed_issuers: Vec::new(),
            allowed_audiences: Vec::new(),
            arn_inventory,
            runtime: runtime.unwrap_or_else(Runtime::current),
            clock,
            evaluated_at: now,
            errors: ValidationErrors::new(),
        };
        result.evaluate();
        result
    }
}

impl VerificationResult {
    /// A result for a token that could not be decoded at all.
    #[must_use]
    pub fn error(message: impl Into<String>, runtime: Runtime, clock: Arc<dyn Clock>) -> Self {
        Self::builder().decode_error(message).runtime(runtime).clock(clock).build()
    }

    /// Decoded header.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Decoded payload.
    #[must_use]
    pub fn payload(&self) -> &Claims {
        &self.payload
    }

    /// Why decoding failed, if it did.
    #[must_use]
    pub fn decode_error(&self) -> Option<&str> {
        self.decode_error.as_deref()
    }

    /// The header's `alg`.
    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.headers.get_str("alg")
    }

    /// The `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.payload.get("iss").and_then(Value::as_str)
    }

    /// The `aud` claim.
    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.payload.get("aud").and_then(Value::as_str)
    }

    /// `iat`, or construction time when absent.
    #[must_use]
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// `exp`, or one second before construction time when absent.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Lifetime the token was issued with.
    #[must_use]
    pub fn initial_lifetime(&self) -> i64 {
        self.expires_at.saturating_sub(self.issued_at)
    }

    /// Token age in seconds as of the last evaluation.
    #[must_use]
    pub fn age(&self) -> i64 {
        self.evaluated_at.saturating_sub(self.issued_at)
    }

    /// Seconds until expiry as of the last evaluation.
    #[must_use]
    pub fn life_left(&self) -> i64 {
        self.expires_at.saturating_sub(self.evaluated_at)
    }

    /// Whether the token had expired at the last evaluation.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.life_left() <= 0
    }

    /// Whether the policy accepted the token.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Why the policy rejected the token.
    #[must_use]
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Issuers currently accepted.
    #[must_use]
    pub fn allowed_issuers(&self) -> &[String] {
        &self.allowed_issuers
    }

    /// Audiences currently accepted.
    #[must_use]
    pub fn allowed_audiences(&self) -> &[String] {
        &self.allowed_audiences
    }

    /// Accepts `issuer` and re-runs the policy.
    ///
    /// Blank values and values already on the list are ignored. Returns
    /// whether the list changed.
    pub fn add_allowed_issuer(&mut self, issuer: impl AsRef<str>) -> bool {
        let added = add_allowed(&mut self.allowed_issuers, issuer.as_ref());
        if added {
            self.evaluate();
        }
        added
    }

    /// Accepts `audience` and re-runs the policy.
    ///
    /// Blank values and values already on the list are ignored. Returns
    /// whether the list changed.
    pub fn add_allowed_audience(&mut self, audience: impl AsRef<str>) -> bool {
        let added = add_allowed(&mut self.allowed_audiences, audience.as_ref());
        if added {
            self.evaluate();
        }
        added
    }

    /// Empties both allow-lists and re-runs the policy.
    pub fn clear_allowed(&mut self) {
        self.allowed_issuers.clear();
        self.allowed_audiences.clear();
        self.evaluate();
    }

    /// Sets or removes the ARN inventory and re-runs the policy.
    pub fn set_arn_inventory(&mut self, inventory: Option<Arc<ArnInventory>>) {
        self.arn_inventory = inventory;
        self.evaluate();
    }

    /// Serializable snapshot of this result.
    ///
    /// Outside production the snapshot also carries age, life left and expiry.
    #[must_use]
    pub fn report(&self) -> VerificationReport<'_> {
        VerificationReport {
            headers: &self.headers,
            payload: &self.payload,
            allowed: AllowedLists { aud: &self.allowed_audiences, iss: &self.allowed_issuers },
            valid: self.is_valid(),
            errors: &self.errors,
            lifetime: (!self.runtime.is_production()).then(|| Lifetime {
                life_left: self.life_left(),
                age: self.age(),
                expired: self.is_expired(),
            }),
        }
    }

    /// The report as a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.report()).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    fn evaluate(&mut self) {
        self.evaluated_at = self.clock.now();
        let mut errors = ValidationErrors::new();

        if let Some(message) = &self.decode_error {
            errors.add_base(message.clone());
            if self.headers.is_empty() && self.payload.is_empty() {
                self.errors = errors;
                return;
            }
        }

        if self.age() > MAX_ALLOWED_AGE {
            errors.add_base("Token is longer lived than allowed");
        }
        if self.is_expired() {
            errors.add_base("Token is expired");
        }

        let issuer_allowed = self.issuer().is_some_and(|iss| contains_ci(&self.allowed_issuers, iss));
        if !issuer_allowed {
            errors.add("iss", "not on the approved list");
        }
        if !self.audience().is_some_and(|aud| contains_ci(&self.allowed_audiences, aud)) {
            errors.add("aud", "not on the approved list");
        }

        if issuer_allowed
            && let Some(inventory) = &self.arn_inventory
            && !inventory.is_empty()
            && let Some(issuer) = self.issuer()
        {
            let registered =
                self.headers.get_str("kid").is_some_and(|kid| inventory.is_valid_arn(issuer, kid));
            if !registered {
                errors.add("kid", format!("not registered to issuer '{issuer}'"));
            }
        }

        self.errors = errors;
    }
}

impl Serialize for VerificationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.report().serialize(serializer)
    }
}

/// Serialized form of a [`VerificationResult`].
#[derive(Debug, Serialize)]
pub struct VerificationReport<'a> {
    /// Decoded header.
    pub headers: &'a Headers,
    /// Decoded payload.
    pub payload: &'a Claims,
    /// Current allow-lists.
    pub allowed: AllowedLists<'a>,
    /// Policy outcome.
    pub valid: bool,
    /// Policy errors keyed by field.
    pub errors: &'a ValidationErrors,
    /// Timing details, omitted in production.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime: Option<Lifetime>,
}

/// Allow-lists as serialized.
#[derive(Debug, Serialize)]
pub struct AllowedLists<'a> {
    /// Accepted audiences.
    pub aud: &'a [String],
    /// Accepted issuers.
    pub iss: &'a [String],
}

/// Timing details as serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lifetime {
    /// Seconds until expiry.
    pub life_left: i64,
    /// Seconds since issue.
    pub age: i64,
    /// Whether the token has expired.
    pub expired: bool,
}

#[allow(clippy::cast_possible_truncation)]
fn numeric_claim(payload: &Claims, name: &str) -> Option<i64> {
    let value = payload.get(name)?;
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

fn contains_ci(list: &[String], value: &str) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(value))
}

fn add_allowed(list: &mut Vec<String>, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() || contains_ci(list, value) {
        return false;
    }
    list.push(value.to_owned());
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::clock::FixedClock;

    const NOW: i64 = 1_700_000_000;
    const KID: &str = "arn:aws:kms:us-west-2:111122223333:key/0001";

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn result_at(clock: &FixedClock, runtime: Runtime, payload: Value) -> VerificationResult {
        VerificationResult::builder()
            .headers(Headers::from(object(json!({"alg": "SISKMSd", "kid": KID}))))
            .payload(object(payload))
            .runtime(runtime)
            .clock(Arc::new(clock.clone()))
            .build()
    }

    fn fresh(clock: &FixedClock) -> VerificationResult {
        result_at(
            clock,
            Runtime::development(),
            json!({"iss": "SISi", "aud": "SISa", "iat": NOW, "exp": NOW + 60}),
        )
    }

    fn allow_defaults(result: &mut VerificationResult) {
        result.add_allowed_issuer("SISi");
        result.add_allowed_audience("SISa");
    }

    #[test]
    fn empty_allow_lists_reject_issuer_and_audience() {
        let clock = FixedClock::new(NOW);
        let result = fresh(&clock);
        assert!(!result.is_valid());
        assert_eq!(result.errors().on("iss"), vec!["not on the approved list"]);
        assert_eq!(result.errors().on("aud"), vec!["not on the approved list"]);
        assert!(result.errors().on("base").is_empty());
    }

    #[test]
    fn allow_lists_make_fresh_token_valid() {
        let clock = FixedClock::new(NOW);
        let mut result = fresh(&clock);
        allow_defaults(&mut result);
        assert!(result.is_valid(), "{:?}", result.errors());
        assert_eq!(result.token_type(), Some("SISKMSd"));
        assert_eq!(result.initial_lifetime(), 60);
    }

    #[test]
    fn allow_lists_are_case_insensitive() {
        let clock = FixedClock::new(NOW);
        let mut result = fresh(&clock);
        result.add_allowed_issuer("sisi");
        result.add_allowed_audience("SISA");
        assert!(result.is_valid(), "{:?}", result.errors());
    }

    #[test]
    fn blank_and_duplicate_additions_are_ignored() {
        let clock = FixedClock::new(NOW);
        let mut result = fresh(&clock);
        assert!(result.add_allowed_issuer("SISi"));
        assert!(!result.add_allowed_issuer("SISi"));
        assert!(!result.add_allowed_issuer("sisI"));
        assert!(!result.add_allowed_issuer("   "));
        assert!(!result.add_allowed_audience(""));
        assert_eq!(result.allowed_issuers(), ["SISi".to_owned()]);
        assert!(result.allowed_audiences().is_empty());
    }

    #[test]
    fn clear_allowed_re_evaluates() {
        let clock = FixedClock::new(NOW);
        let mut result = fresh(&clock);
        allow_defaults(&mut result);
        assert!(result.is_valid());

        result.clear_allowed();
        assert!(!result.is_valid());
        assert!(result.allowed_issuers().is_empty());
        assert_eq!(result.errors().fields(), vec!["iss", "aud"]);
    }

    #[test]
    fn age_boundary_is_inclusive() {
        let clock = FixedClock::new(NOW + MAX_ALLOWED_AGE);
        let mut at_limit = result_at(
            &clock,
            Runtime::development(),
            json!({"iss": "SISi", "aud": "SISa", "iat": NOW, "exp": NOW + 2 * MAX_ALLOWED_AGE}),
        );
        allow_defaults(&mut at_limit);
        assert_eq!(at_limit.age(), MAX_ALLOWED_AGE);
        assert!(at_limit.is_valid(), "{:?}", at_limit.errors());

        clock.advance(1);
        at_limit.clear_allowed();
        allow_defaults(&mut at_limit);
        assert_eq!(at_limit.age(), MAX_ALLOWED_AGE + 1);
        assert_eq!(at_limit.errors().on("base"), vec!["Token is longer lived than allowed"]);
    }

    #[test]
    fn expiry_boundary() {
        let clock = FixedClock::new(NOW + 59);
        let mut result = fresh(&clock);
        allow_defaults(&mut result);
        assert_eq!(result.life_left(), 1);
        assert!(result.is_valid());

        clock.advance(1);
        result.clear_allowed();
        allow_defaults(&mut result);
        assert_eq!(result.life_left(), 0);
        assert!(result.is_expired());
        assert_eq!(result.errors().on("base"), vec!["Token is expired"]);
    }

    #[test]
    fn extreme_timestamps_saturate_and_reject() {
        let clock = FixedClock::new(NOW);
        let mut ancient = result_at(
            &clock,
            Runtime::development(),
            json!({"iss": "SISi", "aud": "SISa", "iat": i64::MIN, "exp": NOW + 60}),
        );
        allow_defaults(&mut ancient);
        assert_eq!(ancient.age(), i64::MAX);
        assert_eq!(ancient.initial_lifetime(), i64::MAX);
        assert_eq!(ancient.errors().on("base"), vec!["Token is longer lived than allowed"]);

        let mut inverted = result_at(
            &clock,
            Runtime::development(),
            json!({"iss": "SISi", "aud": "SISa", "iat": i64::MAX, "exp": i64::MIN}),
        );
        allow_defaults(&mut inverted);
        assert_eq!(inverted.life_left(), i64::MIN);
        assert_eq!(inverted.initial_lifetime(), i64::MIN);
        assert!(inverted.is_expired());
        assert!(!inverted.is_valid());
    }

    #[test]
    fn missing_exp_at_earliest_instant_does_not_overflow() {
        let clock = FixedClock::new(i64::MIN);
        let result = result_at(&clock, Runtime::development(), json!({}));
        assert_eq!(result.expires_at(), i64::MIN);
        assert!(result.is_expired());
    }

    #[test]
    fn missing_exp_counts_as_expired() {
        let clock = FixedClock::new(NOW);
        let mut result =
            result_at(&clock, Runtime::development(), json!({"iss": "SISi", "aud": "SISa"}));
        allow_defaults(&mut result);
        assert_eq!(result.issued_at(), NOW);
        assert_eq!(result.expires_at(), NOW - 1);
        assert_eq!(result.errors().on("base"), vec!["Token is expired"]);
    }

    #[test]
    fn fractional_timestamps_are_truncated() {
        let clock = FixedClock::new(NOW);
        let result = result_at(
            &clock,
            Runtime::development(),
            json!({"iat": NOW as f64 + 0.75, "exp": NOW as f64 + 60.5}),
        );
        assert_eq!(result.issued_at(), NOW);
        assert_eq!(result.expires_at(), NOW + 60);
    }

    #[test]
    fn decode_error_alone_stops_checks() {
        let clock = FixedClock::new(NOW);
        let result = VerificationResult::error(
            "Signature verification failed",
            Runtime::development(),
            Arc::new(clock),
        );
        assert!(!result.is_valid());
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors().on("base"), vec!["Signature verification failed"]);
        assert_eq!(result.decode_error(), Some("Signature verification failed"));
    }

    #[test]
    fn decode_error_with_claims_runs_policy() {
        let clock = FixedClock::new(NOW);
        let result = VerificationResult::builder()
            .payload(object(json!({"iss": "SISi", "aud": "SISa", "iat": NOW, "exp": NOW + 60})))
            .decode_error("something odd")
            .runtime(Runtime::development())
            .clock(Arc::new(clock))
            .build();
        assert_eq!(result.errors().on("base"), vec!["something odd"]);
        assert_eq!(result.errors().on("iss"), vec!["not on the approved list"]);
    }

    #[test]
    fn inventory_requires_kid_registered_to_issuer() {
        let clock = FixedClock::new(NOW);
        let mut result = fresh(&clock);
        allow_defaults(&mut result);

        let inventory = ArnInventory::from_issuers([("SISi", vec![KID])]);
        result.set_arn_inventory(Some(Arc::new(inventory)));
        assert!(result.is_valid(), "{:?}", result.errors());

        let other = ArnInventory::from_issuers([("SISi", vec!["alias/other"]), ("SIE", vec![KID])]);
        result.set_arn_inventory(Some(Arc::new(other)));
        assert_eq!(result.errors().on("kid"), vec!["not registered to issuer 'SISi'"]);
    }

    #[test]
    fn empty_inventory_is_not_enforced() {
        let clock = FixedClock::new(NOW);
        let mut result = fresh(&clock);
        allow_defaults(&mut result);
        result.set_arn_inventory(Some(Arc::new(ArnInventory::default())));
        assert!(result.is_valid());
    }

    #[test]
    fn inventory_is_skipped_when_issuer_already_rejected() {
        let clock = FixedClock::new(NOW);
        let mut result = fresh(&clock);
        result.add_allowed_audience("SISa");
        result.set_arn_inventory(Some(Arc::new(ArnInventory::from_issuers([(
            "SIE",
            vec!["alias/x"],
        )]))));
        assert_eq!(result.errors().fields(), vec!["iss"]);
    }

    #[test]
    fn serialization_includes_lifetime_outside_production() {
        let clock = FixedClock::new(NOW + 10);
        let mut result = fresh(&clock);
        allow_defaults(&mut result);
        let json = result.to_json();
        assert_eq!(json["valid"], json!(true));
        assert_eq!(json["allowed"], json!({"aud": ["SISa"], "iss": ["SISi"]}));
        assert_eq!(json["errors"], json!({}));
        assert_eq!(json["lifetime"], json!({"life_left": 50, "age": 10, "expired": false}));
        assert_eq!(json["headers"]["kid"], json!(KID));
        assert_eq!(json["payload"]["iss"], json!("SISi"));
    }

    #[test]
    fn serialization_omits_lifetime_in_production() {
        let clock = FixedClock::new(NOW);
        let result = result_at(
            &clock,
            Runtime::production(),
            json!({"iss": "SISi", "aud": "SISa", "iat": NOW, "exp": NOW + 60}),
        );
        let json = result.to_json();
        assert!(json.get("lifetime").is_none());
        assert_eq!(json["valid"], json!(false));
        assert_eq!(json["errors"]["iss"], json!(["not on the approved list"]));
    }

    #[test]
    fn serialization_is_stable_without_mutation() {
        let clock = FixedClock::new(NOW);
        let mut result = fresh(&clock);
        allow_defaults(&mut result);
        let first = serde_json::to_string(&result).unwrap();
        clock.advance(30);
        let second = serde_json::to_string(&result).unwrap();
        assert_eq!(first, second);
    }
}
