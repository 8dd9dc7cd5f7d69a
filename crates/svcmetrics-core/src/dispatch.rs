//! Batch dispatcher: submits queries to the monitoring API in chunks that
//! respect the provider's per-call ceiling.
//!
//! Calls are issued sequentially against one shared window. Any provider
//! message or a second result page fails the whole dispatch; nothing is
//! partially accepted or retried here.

use async_trait::async_trait;

use crate::error::{Result, SvcMetricsError};
use crate::model::{MetricDataPage, MetricQuery, RawResultSeries, TimeWindow};

/// Hard limit on queries per "get metric data" call.
pub const MAX_QUERIES_PER_CALL: usize = 500;

/// Monitoring API boundary (one call shape).
#[async_trait]
pub trait MetricDataApi: Send + Sync {
    async fn get_metric_data(
        &self,
        queries: &[MetricQuery],
        window: &TimeWindow,
    ) -> Result<MetricDataPage>;
}

/// Split into contiguous chunks of at most [`MAX_QUERIES_PER_CALL`].
pub fn chunk_queries(queries: &[MetricQuery]) -> std::slice::Chunks<'_, MetricQuery> {
    queries.chunks(MAX_QUERIES_PER_CALL)
}

/// Submit every query and return all result series.
pub async fn dispatch<A>(
    api: &A,
    queries: &[MetricQuery],
    window: &TimeWindow,
) -> Result<Vec<RawResultSeries>>
where
    A: MetricDataApi + ?Sized,
{
    let mut results = Vec::with_capacity(queries.len());
    for chunk in chunk_queries(queries) {
        let page = fetch_chunk(api, chunk, window).await?;
        results.extend(page);
    }
    Ok(results)
}

/// One provider call. A chunk over the ceiling is refused before the
/// provider is called.
async fn fetch_chunk<A>(
    api: &A,
    chunk: &[MetricQuery],
    window: &TimeWindow,
) -> Result<Vec<RawResultSeries>>
where
    A: MetricDataApi + ?Sized,
{
    tracing::info!(
        number_of_queries = chunk.len(),
        start = %window.start,
        end = %window.end,
        "get-metric-data call"
    );
    if chunk.len() > MAX_QUERIES_PER_CALL {
        return Err(SvcMetricsError::BatchTooLarge {
            count: chunk.len(),
            limit: MAX_QUERIES_PER_CALL,
        });
    }

    let page = api.get_metric_data(chunk, window).await.map_err(|e| match e {
        SvcMetricsError::Provider(_) => e,
        other => SvcMetricsError::Provider(other.to_string()),
    })?;

    if !page.messages.is_empty() {
        return Err(SvcMetricsError::ProviderWarnings(page.messages));
    }
    let series_warnings: Vec<String> = page
        .results
        .iter()
        .flat_map(|r| r.warnings.iter().map(move |w| format!("{}: {w}", r.id)))
        .collect();
    if !series_warnings.is_empty() {
        return Err(SvcMetricsError::ProviderWarnings(series_warnings));
    }
    // TODO: follow next_token once query volume can legitimately exceed one page.
    if page.next_token.is_some() {
        return Err(SvcMetricsError::UnexpectedNextPage);
    }

    Ok(page.results)
}
