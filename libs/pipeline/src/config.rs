use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Ingress: Consumer Topic Config
// ═══════════════════════════════════════════════════════════════

/// Как сообщения claim'а группируются в файлы.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyMode {
    /// Один файл на сообщение: ключ = (partition, offset) сообщения.
    #[default]
    Message,
    /// Один файл на partition за цикл claim'а: ключ = (partition,
    /// offset первого сообщения partition'а в этом claim'е).
    Claim,
}

/// Шаблон имени выходного файла.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNaming {
    /// `{topic}-{partition}-{offset}`
    #[default]
    TopicPartitionOffset,
    /// `{partition}-{offset}`
    PartitionOffset,
}

/// Ingress pipeline: topic → файлы в `output_path` (`[[consumers]]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerTopicSpec {
    /// Topic, из которого читаются сообщения.
    pub topic: String,
    /// Consumer group.
    pub group_id: String,
    /// Директория для собранных файлов.
    pub output_path: PathBuf,
    #[serde(default)]
    pub assembly: AssemblyMode,
    #[serde(default)]
    pub naming: FileNaming,
}

impl ConsumerTopicSpec {
    pub fn new(topic: impl Into<String>, group_id: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            topic: topic.into(),
            group_id: group_id.into(),
            output_path: output_path.into(),
            assembly: AssemblyMode::default(),
            naming: FileNaming::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("consumer: 'topic' must not be empty".into());
        }
        if self.group_id.trim().is_empty() {
            return Err(format!("consumer [{}]: 'group_id' must not be empty", self.topic));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(format!("consumer [{}]: 'output_path' must not be empty", self.topic));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Egress: Producer Topic Config
// ═══════════════════════════════════════════════════════════════

/// Egress pipeline: файлы из `source_path` → topic (`[[producers]]`).
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerTopicSpec {
    /// Topic, в который публикуются файлы.
    pub topic: String,
    /// Наблюдаемая директория.
    pub source_path: PathBuf,
    /// Интервал опроса; по умолчанию глобальный `poll_interval_ms`.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl ProducerTopicSpec {
    pub fn new(topic: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            topic: topic.into(),
            source_path: source_path.into(),
            poll_interval_ms: None,
        }
    }

    /// Интервал опроса с учётом глобального значения.
    pub fn poll_interval(&self, default: Duration) -> Duration {
        self.poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(default)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("producer: 'topic' must not be empty".into());
        }
        if self.source_path.as_os_str().is_empty() {
            return Err(format!("producer [{}]: 'source_path' must not be empty", self.topic));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(format!("producer [{}]: 'poll_interval_ms' must be > 0", self.topic));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

/// Проверить, что директории pipelines не пересекаются: у каждой
/// директории ровно один владелец.
pub fn validate_layout(consumers: &[ConsumerTopicSpec], producers: &[ProducerTopicSpec]) -> Result<(), String> {
    let mut owners: Vec<(&Path, String)> = Vec::new();
    let dirs = consumers
        .iter()
        .map(|c| (c.output_path.as_path(), format!("consumer [{}] output_path", c.topic)))
        .chain(
            producers
                .iter()
                .map(|p| (p.source_path.as_path(), format!("producer [{}] source_path", p.topic))),
        );

    for (dir, owner) in dirs {
        if let Some((_, other)) = owners.iter().find(|(d, _)| *d == dir) {
            return Err(format!("{owner} '{}' is already used by {other}", dir.display()));
        }
        owners.push((dir, owner));
    }
    Ok(())
}

/// Создать директорию pipeline'а, если её нет.
pub fn ensure_dir(path: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(path).map_err(PipelineError::io(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Doc {
        consumers: Vec<ConsumerTopicSpec>,
        producers: Vec<ProducerTopicSpec>,
    }

    #[test]
    fn test_parse_specs() {
        let doc: Doc = toml::from_str(
            r#"
            [[consumers]]
            topic = "files.in"
            group_id = "bridge"
            output_path = "/data/in"
            assembly = "claim"
            naming = "partition_offset"

            [[consumers]]
            topic = "files.raw"
            group_id = "bridge"
            output_path = "/data/raw"

            [[producers]]
            topic = "files.out"
            source_path = "/data/out"
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(doc.consumers[0].assembly, AssemblyMode::Claim);
        assert_eq!(doc.consumers[0].naming, FileNaming::PartitionOffset);
        assert_eq!(doc.consumers[1].assembly, AssemblyMode::Message);
        assert_eq!(doc.consumers[1].naming, FileNaming::TopicPartitionOffset);
        assert_eq!(
            doc.producers[0].poll_interval(Duration::from_secs(5)),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_default_poll_interval() {
        let spec = ProducerTopicSpec::new("out", "/data/out");
        assert_eq!(spec.poll_interval(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn test_validate() {
        assert!(ConsumerTopicSpec::new("in", "", "/data").validate().is_err());
        assert!(ConsumerTopicSpec::new("in", "g", "").validate().is_err());
        assert!(ConsumerTopicSpec::new("in", "g", "/data").validate().is_ok());

        let mut producer = ProducerTopicSpec::new("out", "/data/out");
        producer.poll_interval_ms = Some(0);
        assert!(producer.validate().is_err());
    }

    #[test]
    fn test_layout_rejects_shared_directory() {
        let consumers = vec![ConsumerTopicSpec::new("in", "g", "/data/x")];
        let producers = vec![ProducerTopicSpec::new("out", "/data/x")];
        let err = validate_layout(&consumers, &producers).unwrap_err();
        assert!(err.contains("already used"));

        let producers = vec![ProducerTopicSpec::new("out", "/data/y")];
        assert!(validate_layout(&consumers, &producers).is_ok());
    }
}
