use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use axum::{routing::get, Router};

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process and describe the
    /// engine's series. Later calls share the first handle.
    pub fn init() -> Self {
        let handle = HANDLE
            .get_or_init(|| {
                let handle = match PrometheusBuilder::new().install_recorder() {
                    Ok(h) => h,
                    Err(e) => {
                        // Another recorder owns the process; render an empty registry.
                        tracing::warn!(error = %e, "prometheus recorder not installed");
                        PrometheusBuilder::new().build_recorder().handle()
                    }
                };
                describe();
                handle
            })
            .clone();
        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!("turns_total", "Ordinary chat turns processed");
    describe_counter!("analyses_total", "Recommendation rounds started");
    describe_counter!("selections_total", "Quotes confirmed by users");
    describe_counter!(
        "collaborator_errors_total",
        "Language model failures by stage (chat, analysis, advice)"
    );
    describe_counter!("validation_errors_total", "Rejected user inputs");
    describe_counter!(
        "retrieval_embedding_total",
        "Retrievals answered from the vector index"
    );
    describe_counter!(
        "retrieval_fallback_total",
        "Retrievals answered from the static catalog"
    );
    describe_gauge!("active_conversations", "Conversations held in memory");
}
