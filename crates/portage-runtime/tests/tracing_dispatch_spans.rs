#![forbid(unsafe_code)]

//! Tracing contract for the presentation runtime.
//!
//! Verifies the dispatch span, its required fields, which events nest under
//! it, and the targets and levels used for failures.
//!
//! Run:
//!   cargo test -p portage-runtime --test tracing_dispatch_spans

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portage_core::logging::{TARGET_LEDGER, TARGET_QUEUE, TARGET_REGISTRY, TARGET_SURFACE};
use portage_core::{NodeId, SurfaceId};
use portage_harness::Scenario;
use portage_runtime::{RuntimeConfig, SurfaceConfig};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

// ============================================================================
// Capture layer
// ============================================================================

/// A span or event as seen by the layer. `message` is empty for spans.
#[derive(Debug, Clone)]
struct Record {
    name: String,
    target: String,
    level: Level,
    message: String,
    fields: HashMap<String, String>,
    parent: Option<String>,
}

#[derive(Default)]
struct Captured {
    spans: Vec<Record>,
    events: Vec<Record>,
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Captured>>);

impl Capture {
    fn spans_named(&self, name: &str) -> Vec<Record> {
        let captured = self.0.lock().unwrap();
        captured.spans.iter().filter(|s| s.name == name).cloned().collect()
    }

    fn events_with(&self, message: &str) -> Vec<Record> {
        let captured = self.0.lock().unwrap();
        captured.events.iter().filter(|e| e.message == message).cloned().collect()
    }
}

#[derive(Default)]
struct Fields(HashMap<String, String>);

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_owned(), format!("{value:?}"));
    }
}

fn current_span_name<S>(ctx: &Context<'_, S>) -> Option<String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    ctx.lookup_current().map(|span| span.name().to_owned())
}

impl<S> tracing_subscriber::Layer<S> for Capture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, _id: &tracing::span::Id, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        attrs.record(&mut fields);
        let meta = attrs.metadata();
        let record = Record {
            name: meta.name().to_owned(),
            target: meta.target().to_owned(),
            level: *meta.level(),
            message: String::new(),
            fields: fields.0,
            parent: current_span_name(&ctx),
        };
        self.0.lock().unwrap().spans.push(record);
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let meta = event.metadata();
        let record = Record {
            name: meta.name().to_owned(),
            target: meta.target().to_owned(),
            level: *meta.level(),
            message: fields.0.remove("message").unwrap_or_default(),
            fields: fields.0,
            parent: current_span_name(&ctx),
        };
        self.0.lock().unwrap().events.push(record);
    }
}

fn with_captured_spans(f: impl FnOnce()) -> Capture {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::filter::LevelFilter::TRACE)
        .with(capture.clone());
    tracing::subscriber::with_default(subscriber, f);
    capture
}

const DISPATCH_SPAN: &str = "presentation.dispatch";
const S1: SurfaceId = SurfaceId::new(1);

fn mounted() -> Scenario {
    let mut sc = Scenario::new(RuntimeConfig::default().watchdog_timeout(Some(Duration::from_millis(100))));
    sc.mount_anchor(NodeId::new(10), S1, &[NodeId::new(11)]).unwrap();
    sc
}

// ============================================================================
// Dispatch span
// ============================================================================

#[test]
fn dispatch_span_carries_operation_fields() {
    let handle = with_captured_spans(|| {
        let mut sc = mounted();
        sc.ctx_mut().present(S1, SurfaceConfig::default()).unwrap();
        sc.settle();
        sc.ctx_mut().dismiss(S1);
        sc.settle();
    });

    let spans = handle.spans_named(DISPATCH_SPAN);
    assert_eq!(spans.len(), 2);
    for span in &spans {
        assert_eq!(span.target, TARGET_QUEUE);
        assert_eq!(span.level, Level::DEBUG);
        assert!(span.parent.is_none(), "dispatch is a root span");
        for field in ["operation_id", "surface_id", "kind"] {
            assert!(span.fields.contains_key(field), "missing {field}");
        }
        assert_eq!(span.fields["surface_id"], "1");
    }
    assert_eq!(spans[0].fields["operation_id"], "1");
    assert_eq!(spans[0].fields["kind"], "present");
    assert_eq!(spans[1].fields["kind"], "dismiss");
}

#[test]
fn dispatched_transition_nests_under_span() {
    let handle = with_captured_spans(|| {
        let mut sc = mounted();
        sc.ctx_mut().present(S1, SurfaceConfig::default()).unwrap();
        sc.settle();
    });

    let transitions = handle.events_with("surface transition");
    assert_eq!(transitions.len(), 2);
    let dispatched = &transitions[0];
    assert_eq!(dispatched.target, TARGET_SURFACE);
    assert_eq!(dispatched.parent.as_deref(), Some(DISPATCH_SPAN));
    assert_eq!(dispatched.fields["from"], "idle");
    assert_eq!(dispatched.fields["to"], "presenting");

    // The native callback arrives outside any dispatch.
    assert!(transitions[1].parent.is_none());
    assert_eq!(transitions[1].fields["to"], "presented");

    let completed = handle.events_with("operation completed");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].level, Level::INFO);
    assert!(completed[0].fields.contains_key("elapsed_ms"));
}

#[test]
fn skipped_operation_is_logged_in_span() {
    let handle = with_captured_spans(|| {
        let mut sc = mounted();
        sc.ctx_mut().dismiss(S1);
    });
    let skipped = handle.events_with("skipping operation");
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].target, TARGET_QUEUE);
    assert_eq!(skipped[0].parent.as_deref(), Some(DISPATCH_SPAN));
    assert_eq!(skipped[0].fields["reason"], "NoActiveSurface");
}

// ============================================================================
// Failure levels and targets
// ============================================================================

#[test]
fn watchdog_expiry_logs_error_on_queue_target() {
    let handle = with_captured_spans(|| {
        let mut sc = mounted();
        sc.host_mut().drop_next_callbacks(1);
        sc.ctx_mut().present(S1, SurfaceConfig::default()).unwrap();
        sc.advance(Duration::from_millis(100));
    });

    let expired = handle.events_with("watchdog expired waiting for native callback");
    assert_eq!(expired.len(), 1);
    let event = &expired[0];
    assert_eq!(event.level, Level::ERROR);
    assert_eq!(event.target, TARGET_QUEUE);
    assert_eq!(event.fields["surface_id"], "1");
    assert_eq!(event.fields["kind"], "present");

    let unfinished = handle.events_with("operation did not complete");
    assert_eq!(unfinished.len(), 1);
    assert_eq!(unfinished[0].level, Level::WARN);
    assert_eq!(unfinished[0].fields["outcome"], "failed");
}

#[test]
fn buffering_and_ledger_moves_use_their_targets() {
    let handle = with_captured_spans(|| {
        let mut sc = Scenario::default();
        let _ = sc.mount_source(NodeId::new(10), "toolbar", false, &[NodeId::new(11)]);
    });

    let buffered = handle.events_with("content submitted to unregistered target; buffering");
    assert_eq!(buffered.len(), 1);
    assert_eq!(buffered[0].target, TARGET_REGISTRY);
    assert_eq!(buffered[0].level, Level::WARN);
    assert_eq!(buffered[0].fields["target_id"], "toolbar");

    let adopts = handle.events_with("adopt");
    assert!(!adopts.is_empty());
    assert!(adopts.iter().all(|e| e.target == TARGET_LEDGER));
}
