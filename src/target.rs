use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::clients::WooCommerceClient;
use crate::config::Config;
use crate::models::*;
use crate::reference::ReferenceCache;
use crate::singer::{parse_line, SingerMessage};
use crate::sinks::*;
use crate::stats::{RunStatistics, RunSummary, SummaryGuard};

/// Every sink shares one reference cache, so each catalog is fetched at most once per run.
pub struct Target {
    run_id: Uuid,
    cache: Arc<ReferenceCache>,
    orders: SalesOrdersSink,
    inventory: UpdateInventorySink,
    products: ProductsSink,
    order_notes: OrderNotesSink,
    stats: Arc<Mutex<RunStatistics>>,
}

impl Target {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self::with_client(WooCommerceClient::new(cfg)?, cfg))
    }

    pub fn with_client(client: WooCommerceClient, cfg: &Config) -> Self {
        let cache = Arc::new(ReferenceCache::new(client));
        Self {
            run_id: Uuid::new_v4(),
            orders: SalesOrdersSink::new(cache.clone(), cfg.line_item_policy.clone()),
            inventory: UpdateInventorySink::new(cache.clone()),
            products: ProductsSink::new(cache.clone()),
            order_notes: OrderNotesSink::new(cache.clone()),
            cache,
            stats: Arc::new(Mutex::new(RunStatistics::new(cfg.max_sampled_errors))),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cache(&self) -> &Arc<ReferenceCache> {
        &self.cache
    }

    pub fn statistics(&self) -> Arc<Mutex<RunStatistics>> {
        self.stats.clone()
    }

    pub fn summarize(&self) -> RunSummary {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).summarize()
    }

    /// Route one record to its sink and count the result. Streams without a sink count as skipped.
    pub async fn process_record(&self, stream: &str, raw: &Value) -> RecordEvent {
        let kind = StreamKind::from_stream_name(stream);
        let event = match kind {
            Some(StreamKind::SalesOrders) => self.orders.process_record(SinkInput::Raw(raw)).await,
            Some(StreamKind::UpdateInventory) => self.inventory.process_record(SinkInput::Raw(raw)).await,
            Some(StreamKind::Products) => self.products.process_record(SinkInput::Raw(raw)).await,
            Some(StreamKind::OrderNotes) => self.order_notes.process_record(SinkInput::Raw(raw)).await,
            None => {
                tracing::warn!(run_id = %self.run_id, stream = stream, "No sink for stream; skipping record");
                RecordEvent::Skipped { reason: format!("no sink for stream '{}'", stream) }
            }
        };
        let key = kind.map(|k| k.name()).unwrap_or(stream);
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).record(key, &event);
        event
    }

    /// Consume Singer messages until end of input, then write the last STATE to `writer`.
    ///
    /// The summary is logged on every exit path, including a protocol error part-way through.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<RunSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(run_id = %self.run_id, base_url = self.cache.client().base_url(), "Starting target run");
        let guard = SummaryGuard::new(self.stats.clone());
        let mut lines = reader.lines();
        let mut state: Option<Value> = None;
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            match parse_line(&line, line_no)? {
                Some(SingerMessage::Record { stream, record, .. }) => {
                    self.process_record(&stream, &record).await;
                }
                Some(SingerMessage::Schema { stream, key_properties, .. }) => {
                    tracing::info!(stream = %stream, key_properties = ?key_properties, "Schema received");
                }
                Some(SingerMessage::State { value }) => state = Some(value),
                Some(SingerMessage::Other) => tracing::debug!(line = line_no, "Ignoring unsupported message"),
                None => {}
            }
        }

        if let Some(state) = state {
            let mut out = serde_json::to_vec(&state)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
        }
        tracing::info!(run_id = %self.run_id, lines = line_no, "Input exhausted");
        Ok(guard.finish())
    }
}
