//! Run Statistics Aggregator: one terminal event per record, summarized once at the end of the run.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::models::RecordEvent;

const TOP_MESSAGES: usize = 3;
// cap the distinct-message map so a run of unique errors stays bounded
const MAX_DISTINCT_MESSAGES: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub created: u64,
    pub updated: u64,
    /// Most recent messages, oldest first.
    pub errors: VecDeque<String>,
    message_counts: HashMap<String, u64>,
}

impl StreamStats {
    fn note_message(&mut self, message: &str, max_sampled: usize) {
        if max_sampled > 0 {
            if self.errors.len() >= max_sampled {
                self.errors.pop_front();
            }
            self.errors.push_back(message.to_string());
        }
        if let Some(n) = self.message_counts.get_mut(message) {
            *n += 1;
        } else if self.message_counts.len() < MAX_DISTINCT_MESSAGES {
            self.message_counts.insert(message.to_string(), 1);
        }
    }

    fn absorb(&mut self, other: &StreamStats) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.created += other.created;
        self.updated += other.updated;
        for (msg, n) in &other.message_counts {
            *self.message_counts.entry(msg.clone()).or_insert(0) += n;
        }
    }

    fn top_messages(&self) -> Vec<(String, u64)> {
        let mut top: Vec<(String, u64)> = self.message_counts.iter().map(|(m, n)| (m.clone(), *n)).collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(TOP_MESSAGES);
        top
    }

    fn summary(&self, stream: &str) -> StreamSummary {
        StreamSummary {
            stream: stream.to_string(),
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            created: self.created,
            updated: self.updated,
            success_rate: if self.total == 0 { 0.0 } else { self.succeeded as f64 / self.total as f64 },
            top_errors: self.top_messages(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSummary {
    pub stream: String,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub created: u64,
    pub updated: u64,
    pub success_rate: f64,
    pub top_errors: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub streams: Vec<StreamSummary>,
    pub overall: StreamSummary,
}

#[derive(Debug, Default)]
pub struct RunStatistics {
    max_sampled_errors: usize,
    streams: BTreeMap<String, StreamStats>,
}

impl RunStatistics {
    pub fn new(max_sampled_errors: usize) -> Self {
        Self { max_sampled_errors, streams: BTreeMap::new() }
    }

    /// Count one terminal event. Counters only ever grow.
    pub fn record(&mut self, stream: &str, event: &RecordEvent) {
        let max_sampled = self.max_sampled_errors;
        let stats = self.streams.entry(stream.to_string()).or_default();
        stats.total += 1;
        match event {
            RecordEvent::Upserted(outcome) if outcome.success => {
                stats.succeeded += 1;
                if outcome.is_update() {
                    stats.updated += 1;
                } else {
                    stats.created += 1;
                }
            }
            RecordEvent::Upserted(outcome) => {
                stats.failed += 1;
                let msg = outcome.detail.error.as_deref().unwrap_or("unknown error");
                stats.note_message(msg, max_sampled);
            }
            RecordEvent::Skipped { reason } => {
                stats.skipped += 1;
                stats.note_message(reason, max_sampled);
            }
        }
    }

    pub fn stream(&self, stream: &str) -> Option<&StreamStats> {
        self.streams.get(stream)
    }

    pub fn summarize(&self) -> RunSummary {
        let mut overall = StreamStats::default();
        let streams = self
            .streams
            .iter()
            .map(|(name, s)| {
                overall.absorb(s);
                s.summary(name)
            })
            .collect();
        RunSummary { streams, overall: overall.summary("ALL") }
    }

    /// Log the summary, one line per stream plus the overall line.
    pub fn report(&self) -> RunSummary {
        let summary = self.summarize();
        for s in summary.streams.iter().chain(std::iter::once(&summary.overall)) {
            let top = serde_json::to_string(&s.top_errors).unwrap_or_else(|_| "[]".to_string());
            let rate = format!("{:.1}%", s.success_rate * 100.0);
            if s.failed > 0 {
                tracing::warn!(stream = %s.stream, total = s.total, succeeded = s.succeeded, failed = s.failed, skipped = s.skipped, created = s.created, updated = s.updated, success_rate = %rate, top_messages = %top, "Export summary");
            } else {
                tracing::info!(stream = %s.stream, total = s.total, succeeded = s.succeeded, failed = s.failed, skipped = s.skipped, created = s.created, updated = s.updated, success_rate = %rate, top_messages = %top, "Export summary");
            }
        }
        summary
    }
}

/// Emits the summary exactly once: on `finish`, or on drop if the run ended early.
pub struct SummaryGuard {
    stats: Arc<Mutex<RunStatistics>>,
    reported: bool,
}

impl SummaryGuard {
    pub fn new(stats: Arc<Mutex<RunStatistics>>) -> Self {
        Self { stats, reported: false }
    }

    pub fn finish(mut self) -> RunSummary {
        self.reported = true;
        let stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.report()
    }
}

impl Drop for SummaryGuard {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        tracing::warn!("Run ended early; emitting summary");
        let stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.report();
    }
}
