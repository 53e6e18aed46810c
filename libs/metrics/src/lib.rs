//! Реестр метрик моста: счётчики и гистограммы с label'ом `topic`.
//!
//! Реестр создаётся один раз при старте и передаётся в каждый pipeline
//! через `Arc`, без глобальной регистрации. Экспорт в текстовом
//! формате Prometheus (exposition format 0.0.4).

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Границы bucket'ов гистограммы (секунды), стандартный набор Prometheus.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

const CONSUMED: &str = "kafka_consumed_messages_total";
const PRODUCED: &str = "kafka_produced_messages_total";
const WRITTEN: &str = "kafka_files_written_total";
const FAILED: &str = "kafka_failed_messages_total";
const DURATION: &str = "file_processing_duration_seconds";

// ═══════════════════════════════════════════════════════════════
//  Histogram
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct HistogramState {
    /// Не кумулятивные счётчики: `counts[i]` = наблюдения в (bucket[i-1], bucket[i]].
    /// Последний элемент: наблюдения больше последней границы.
    counts: [u64; DEFAULT_BUCKETS.len() + 1],
    sum: f64,
    count: u64,
}

impl HistogramState {
    fn observe(&mut self, secs: f64) {
        let idx = DEFAULT_BUCKETS
            .iter()
            .position(|le| secs <= *le)
            .unwrap_or(DEFAULT_BUCKETS.len());
        self.counts[idx] += 1;
        self.sum += secs;
        self.count += 1;
    }
}

// ═══════════════════════════════════════════════════════════════
//  TopicMetrics
// ═══════════════════════════════════════════════════════════════

/// Метрики одного topic'а. Pipeline держит `Arc` на свой экземпляр.
#[derive(Default)]
pub struct TopicMetrics {
    consumed: AtomicU64,
    produced: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    duration: Mutex<HistogramState>,
}

impl TopicMetrics {
    /// Сообщение получено из брокера (ingress).
    pub fn inc_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    /// Сообщение подтверждено брокером (egress).
    pub fn inc_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Файл записан в output директорию (ingress).
    pub fn inc_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    /// Ошибка обработки: неудачная публикация, запись файла или чтение source директории.
    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Длительность обработки одного файла.
    pub fn observe_duration(&self, elapsed: Duration) {
        let mut h = self.duration.lock().unwrap_or_else(|e| e.into_inner());
        h.observe(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self) -> TopicSnapshot {
        let h = self.duration.lock().unwrap_or_else(|e| e.into_inner());
        TopicSnapshot {
            consumed: self.consumed.load(Ordering::Relaxed),
            produced: self.produced.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            duration_count: h.count,
            duration_sum: h.sum,
        }
    }
}

/// Снимок значений метрик topic'а.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TopicSnapshot {
    pub consumed: u64,
    pub produced: u64,
    pub written: u64,
    pub failed: u64,
    pub duration_count: u64,
    pub duration_sum: f64,
}

// ═══════════════════════════════════════════════════════════════
//  BridgeMetrics
// ═══════════════════════════════════════════════════════════════

/// Реестр метрик всех topic'ов.
#[derive(Default)]
pub struct BridgeMetrics {
    topics: RwLock<BTreeMap<String, Arc<TopicMetrics>>>,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Получить (или создать) метрики topic'а.
    pub fn topic(&self, topic: &str) -> Arc<TopicMetrics> {
        if let Some(m) = self.topics.read().unwrap_or_else(|e| e.into_inner()).get(topic) {
            return m.clone();
        }
        let mut topics = self.topics.write().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic.to_string())
            .or_insert_with(|| {
                tracing::debug!(%topic, "registered topic metrics");
                Arc::new(TopicMetrics::default())
            })
            .clone()
    }

    /// Снимок метрик topic'а, если он зарегистрирован.
    pub fn snapshot(&self, topic: &str) -> Option<TopicSnapshot> {
        self.topics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .map(|m| m.snapshot())
    }

    /// Текстовый формат Prometheus.
    pub fn render(&self) -> String {
        let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();

        let counters: [(&str, &str, fn(&TopicMetrics) -> u64); 4] = [
            (CONSUMED, "Total number of consumed Kafka messages.", |m| m.consumed.load(Ordering::Relaxed)),
            (PRODUCED, "Total number of produced Kafka messages.", |m| m.produced.load(Ordering::Relaxed)),
            (WRITTEN, "Total number of files written from consumed messages.", |m| m.written.load(Ordering::Relaxed)),
            (FAILED, "Total number of failed publishes and file writes.", |m| m.failed.load(Ordering::Relaxed)),
        ];

        for (name, help, get) in counters {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            for (topic, m) in topics.iter() {
                let _ = writeln!(out, "{name}{{topic=\"{}\"}} {}", escape_label(topic), get(m));
            }
        }

        let _ = writeln!(out, "# HELP {DURATION} Duration of file processing in seconds.");
        let _ = writeln!(out, "# TYPE {DURATION} histogram");
        for (topic, m) in topics.iter() {
            let topic = escape_label(topic);
            let h = m.duration.lock().unwrap_or_else(|e| e.into_inner());
            let mut cumulative = 0u64;
            for (le, count) in DEFAULT_BUCKETS.iter().zip(h.counts.iter()) {
                cumulative += count;
                let _ = writeln!(out, "{DURATION}_bucket{{topic=\"{topic}\",le=\"{le}\"}} {cumulative}");
            }
            let _ = writeln!(out, "{DURATION}_bucket{{topic=\"{topic}\",le=\"+Inf\"}} {}", h.count);
            let _ = writeln!(out, "{DURATION}_sum{{topic=\"{topic}\"}} {}", h.sum);
            let _ = writeln!(out, "{DURATION}_count{{topic=\"{topic}\"}} {}", h.count);
        }

        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
