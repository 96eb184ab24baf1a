//! The per-request stream pipeline.
//!
//! Stage order is fixed: fetch → SeaDex precompute → filter → preferred and
//! ranked precompute → sort → deduplicate. Context fetches run concurrently
//! with the addon fan-out; everything after the fan-out is CPU-only and
//! runs to completion without yielding mid-list.

pub mod dedupe;
pub mod fetch;
pub mod filter;
pub mod precompute;
pub mod sort;

pub use fetch::{AddonClient, FetchOutcome, Fetcher};

use crate::context::StreamContext;
use crate::models::ParsedStream;
use tracing::info;

/// What a pipeline run hands back. A failed fan-out yields an empty list
/// and a status message, never an error.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub streams: Vec<ParsedStream>,
    pub message: Option<String>,
    /// Non-fatal issues surfaced to the caller (dropped expressions and
    /// the like).
    pub warnings: Vec<String>,
}

#[derive(Clone, Default)]
pub struct StreamPipeline {
    fetcher: Fetcher,
}

impl StreamPipeline {
    #[must_use]
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    pub async fn run(&self, context: &StreamContext) -> PipelineOutcome {
        let start = std::time::Instant::now();
        info!(
            event = "pipeline_started",
            id = %context.raw_id(),
            query_type = %context.query_type(),
            "Running stream pipeline"
        );
        metrics::counter!("pipeline_requests_total").increment(1);

        let (fetch_outcome, ()) = tokio::join!(
            self.fetcher
                .fetch(context.media_type(), context.raw_id(), context.user()),
            context.start_all_fetches(),
        );

        // Fail soft only when the fan-out produced nothing at all: no
        // addon responded and no last-good cached result exists.
        if fetch_outcome.responded == 0 && !fetch_outcome.from_cache {
            info!(
                event = "pipeline_finished",
                id = %context.raw_id(),
                streams = 0,
                duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "No addon responded and no cached result exists"
            );
            return PipelineOutcome {
                streams: Vec::new(),
                message: Some(format!(
                    "No response from any of the {} configured addon(s)",
                    fetch_outcome.total
                )),
                warnings: Vec::new(),
            };
        }

        let message = fetch_outcome
            .from_cache
            .then(|| "No addon responded; serving the last cached results".to_string());

        let mut warnings = Vec::new();
        let mut streams = fetch_outcome.streams;
        let fetched = streams.len();

        // SeaDex tags must exist before any filter can reference them.
        if let Some(info) = context.get_seadex().await {
            precompute::apply_seadex_tags(&mut streams, info);
        }

        let expression_context = context.expression_context().await;

        streams =
            filter::filter_streams(streams, context, &expression_context, &mut warnings).await;

        let user = context.user();
        precompute::annotate_preferred(&mut streams, user, &expression_context, &mut warnings);
        precompute::apply_ranked_scores(&mut streams, user, &expression_context, &mut warnings);

        sort::sort_streams(&mut streams, user);
        streams = dedupe::deduplicate(streams, user);

        info!(
            event = "pipeline_finished",
            id = %context.raw_id(),
            fetched,
            streams = streams.len(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Stream pipeline finished"
        );
        metrics::histogram!("pipeline_duration_seconds").record(start.elapsed().as_secs_f64());

        PipelineOutcome {
            streams,
            message,
            warnings,
        }
    }
}
