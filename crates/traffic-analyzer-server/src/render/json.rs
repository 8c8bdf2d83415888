//! JSON rendering: `{"parameters": ..., "data": [...]}`, streamed straight
//! off the database cursor rather than buffered whole — a report with a
//! large row count never needs its full row set resident in memory.

use bytes::Bytes;
use futures_util::TryStreamExt;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use traffic_analyzer_core::model::ReportParameters;

use super::RenderError;

type Chunk = Result<Bytes, std::io::Error>;

/// Spawns the render as a detached task and returns a stream of body
/// chunks. The task keeps running to completion even if the receiver end
/// is dropped (e.g. the HTTP handler hit the render timeout) — it is
/// abandoned, not cancelled. Rows are pulled from the database one at a
/// time via `fetch`, not materialized into a `Vec` first.
pub fn render_json_stream_from_db(pool: PgPool, report_id: i64, parameters: ReportParameters) -> ReceiverStream<Chunk> {
    let (tx, rx) = mpsc::channel::<Chunk>(16);

    tokio::spawn(async move {
        if let Err(e) = write_stream(&tx, &pool, report_id, &parameters).await {
            let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
        }
    });

    ReceiverStream::new(rx)
}

async fn write_stream(
    tx: &mpsc::Sender<Chunk>,
    pool: &PgPool,
    report_id: i64,
    parameters: &ReportParameters,
) -> Result<(), RenderError> {
    let params_json = serde_json::to_string(parameters)?;
    send(tx, format!("{{\"parameters\":{params_json},\"data\":[")).await;

    let mut rows = sqlx::query_as::<_, (serde_json::Value,)>(
        "SELECT row_json FROM report_row WHERE report_id = $1 ORDER BY report_row_id",
    )
    .bind(report_id)
    .fetch(pool);

    let mut idx = 0usize;
    while let Some((row_json,)) = rows.try_next().await? {
        let prefix = if idx == 0 { "" } else { "," };
        send(tx, format!("{prefix}{row_json}")).await;
        idx += 1;
    }

    send(tx, "]}".to_string()).await;
    Ok(())
}

async fn send(tx: &mpsc::Sender<Chunk>, chunk: String) {
    // The receiver may already be gone (timeout abandoned the render); a
    // dropped channel is not a failure worth logging on every row.
    let _ = tx.send(Ok(Bytes::from(chunk))).await;
}
