//! Verifies that signing and verification produce spans.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use serde_json::Map;
use sisjwt::{Runtime, SisJwt, SisJwtOptions, TOKEN_TYPE_V1};
use sisjwt_kms::testutil::{TEST_SIGNING_ALGORITHM, memory_kms_with_key};
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

// ---------------------------------------------------------------------------
// Collecting layer
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            self.spans.lock().expect("lock poisoned").push(span.name().to_owned());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dev_encode_and_verify_create_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let options =
        SisJwtOptions::builder().runtime(Runtime::development()).iss("SISi").aud("SISa").build();
    let sisjwt = SisJwt::builder().options(Arc::new(options)).build().expect("valid options");
    let token = sisjwt.encode(Map::new()).await.expect("encode");
    sisjwt.verify(&token).await.expect("verify");

    let recorded = spans.lock().expect("lock poisoned");
    assert!(recorded.iter().any(|s| s == "encode"), "expected an 'encode' span, got: {recorded:?}");
    assert!(recorded.iter().any(|s| s == "verify"), "expected a 'verify' span, got: {recorded:?}");
    assert!(recorded.iter().any(|s| s == "sign"), "expected a 'sign' span, got: {recorded:?}");
}

#[tokio::test]
async fn kms_verification_creates_resolver_and_backend_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let subscriber = tracing_subscriber::registry().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (kms, key_id) = memory_kms_with_key("us-west-2");
    let options = SisJwtOptions::builder()
        .runtime(Runtime::production())
        .token_type(TOKEN_TYPE_V1)
        .key_id(key_id)
        .key_alg(TEST_SIGNING_ALGORITHM)
        .aws_region("us-west-2")
        .iss("SISi")
        .aud("SISa")
        .build();
    let sisjwt =
        SisJwt::builder().options(Arc::new(options)).kms(kms).build().expect("valid options");
    let token = sisjwt.encode(Map::new()).await.expect("encode");
    sisjwt.verify(&token).await.expect("verify");

    let recorded = spans.lock().expect("lock poisoned");
    let verify_spans = recorded.iter().filter(|s| *s == "verify").count();
    // Façade, algorithm, resolver and backend each open one.
    assert!(verify_spans >= 4, "expected nested 'verify' spans, got: {recorded:?}");
}
