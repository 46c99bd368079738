use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use relay_embedder::EmbedderObserver;
use relay_resilience::{BreakerObserver, BreakerState};
use relay_stream::{SessionOutcome, StreamObserver};
use std::sync::Arc;

/// Collects core telemetry into a prometheus registry.
///
/// Attach one instance as the observer of the breaker registry, the
/// embedder, and the stream orchestrator.
pub struct MetricsRecorder {
    registry: Arc<Registry>,
    breaker_transitions: IntCounterVec,
    embed_calls: IntCounterVec,
    embed_latency: Histogram,
    tokens_streamed: IntCounter,
    active_sessions: IntGauge,
    sessions_closed: IntCounterVec,
    session_duration: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let breaker_transitions = IntCounterVec::new(
            Opts::new(
                "relay_breaker_transitions_total",
                "Circuit breaker state transitions",
            ),
            &["breaker", "to"],
        )?;
        let embed_calls = IntCounterVec::new(
            Opts::new(
                "relay_embed_calls_total",
                "Embedding backend round trips by outcome",
            ),
            &["outcome"],
        )?;
        let embed_latency = Histogram::with_opts(
            HistogramOpts::new(
                "relay_embed_latency_ms",
                "Embedding backend round trip latency",
            )
            .buckets(vec![5.0, 20.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]),
        )?;
        let tokens_streamed = IntCounter::with_opts(Opts::new(
            "relay_tokens_streamed_total",
            "Completion tokens forwarded to consumers",
        ))?;
        let active_sessions = IntGauge::with_opts(Opts::new(
            "relay_active_sessions",
            "Streaming sessions currently running",
        ))?;
        let sessions_closed = IntCounterVec::new(
            Opts::new(
                "relay_sessions_closed_total",
                "Streaming sessions by terminal outcome",
            ),
            &["outcome"],
        )?;
        let session_duration = Histogram::with_opts(
            HistogramOpts::new(
                "relay_session_duration_ms",
                "Streaming session duration",
            )
            .buckets(vec![50.0, 250.0, 1000.0, 5000.0, 15000.0, 60000.0]),
        )?;

        registry.register(Box::new(breaker_transitions.clone()))?;
        registry.register(Box::new(embed_calls.clone()))?;
        registry.register(Box::new(embed_latency.clone()))?;
        registry.register(Box::new(tokens_streamed.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;
        registry.register(Box::new(sessions_closed.clone()))?;
        registry.register(Box::new(session_duration.clone()))?;

        Ok(Self {
            registry,
            breaker_transitions,
            embed_calls,
            embed_latency,
            tokens_streamed,
            active_sessions,
            sessions_closed,
            session_duration,
        })
    }

    /// The backing registry, for the exporter
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }
}

impl BreakerObserver for MetricsRecorder {
    fn on_transition(&self, name: &str, _from: BreakerState, to: BreakerState) {
        let to = match to {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        };
        self.breaker_transitions.with_label_values(&[name, to]).inc();
    }
}

impl EmbedderObserver for MetricsRecorder {
    fn on_embed_call(&self, _batch_size: usize, success: bool, latency_ms: f64) {
        let outcome = if success { "ok" } else { "error" };
        self.embed_calls.with_label_values(&[outcome]).inc();
        self.embed_latency.observe(latency_ms);
    }
}

impl StreamObserver for MetricsRecorder {
    fn on_session_started(&self, _id: &str) {
        self.active_sessions.inc();
    }

    fn on_token(&self) {
        self.tokens_streamed.inc();
    }

    fn on_session_closed(&self, _id: &str, outcome: SessionOutcome, duration_ms: f64) {
        self.active_sessions.dec();
        let outcome = match outcome {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Cancelled => "cancelled",
            SessionOutcome::TimedOut => "timed_out",
            SessionOutcome::Errored => "errored",
            SessionOutcome::Rejected => "rejected",
        };
        self.sessions_closed.with_label_values(&[outcome]).inc();
        self.session_duration.observe(duration_ms);
    }
}
