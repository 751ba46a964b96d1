use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feed_fetch_articles_total",
            "Raw articles admitted by the fetcher."
        );
        describe_counter!(
            "feed_fetch_rejected_total",
            "Items rejected by the fetcher, labelled by reason."
        );
        describe_counter!(
            "feed_source_errors_total",
            "News search / feed calls that failed or timed out."
        );
        describe_counter!(
            "feed_llm_fallback_total",
            "Theme builds that fell back to one theme per cluster."
        );
        describe_counter!(
            "feed_pipeline_runs_total",
            "Pipeline runs, labelled by outcome."
        );
        describe_gauge!(
            "feed_pipeline_last_run_ts",
            "Unix ts when the pipeline last completed."
        );
        describe_histogram!("feed_fetch_ms", "Fetch stage wall time in milliseconds.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Handle backed by a recorder that is not installed globally (tests).
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }
}
