// Newline-delimited JSON progress protocol.
//
// Every event carries the job id and a per-job sequence number that
// only ever increases, so consumers can detect reordering or loss.
// Exactly one terminal event (result or error) ends each stream.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::job::JobId;

/// Reference to a produced file, as shown to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub label: String,
    pub file: String,
}

/// Event payload, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventBody {
    Progress {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<usize>,
    },
    Result {
        files: Vec<ArtifactRef>,
        #[serde(skip_serializing_if = "Option::is_none")]
        log: Option<String>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        log: Option<String>,
    },
}

impl EventBody {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
            stage: None,
            current: None,
            total: None,
        }
    }

    pub fn progress_counted(
        message: impl Into<String>,
        stage: impl Into<String>,
        current: usize,
        total: usize,
    ) -> Self {
        Self::Progress {
            message: message.into(),
            stage: Some(stage.into()),
            current: Some(current),
            total: Some(total),
        }
    }
}

/// One wire event. `seq` is monotonic per job across the job's whole
/// lifetime, retries included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub seq: u64,
    #[serde(flatten)]
    pub body: EventBody,
}

impl ProgressEvent {
    /// Serialize as one NDJSON line, trailing newline included.
    pub fn encode_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Incremental NDJSON decoder. Feed arbitrary chunks; complete lines
/// come out as events, a partial trailing line is buffered until its
/// newline arrives.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<ProgressEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ProgressEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!("Skipping malformed progress line: {}", e);
                }
            }
        }
        events
    }

    /// True if a partial line is still waiting for its newline.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(seq: u64, body: EventBody) -> ProgressEvent {
        ProgressEvent {
            job_id: Uuid::nil(),
            seq,
            body,
        }
    }

    #[test]
    fn test_encode_line_shape() {
        let line = event(3, EventBody::progress("Extracting audio"))
            .encode_line()
            .unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"type\":\"progress\""));
        assert!(line.contains("\"seq\":3"));
        assert!(line.contains("\"message\":\"Extracting audio\""));
        // Optional fields stay off the wire when unset.
        assert!(!line.contains("stage"));
        assert!(!line.contains("current"));
    }

    #[test]
    fn test_result_event_round_trip() {
        let original = event(
            9,
            EventBody::Result {
                files: vec![ArtifactRef {
                    label: "Original Subtitles (.srt)".to_string(),
                    file: "lecture.en.srt".to_string(),
                }],
                log: Some("logs/job.log.jsonl".to_string()),
            },
        );
        let line = original.encode_line().unwrap();
        let mut decoder = LineDecoder::new();
        let decoded = decoder.feed(&line);
        assert_eq!(decoded, vec![original]);
    }

    #[test]
    fn test_decoder_buffers_partial_lines() {
        let line = event(1, EventBody::progress("Transcribing"))
            .encode_line()
            .unwrap();
        let (head, tail) = line.split_at(line.len() / 2);

        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(head).is_empty());
        assert!(decoder.has_partial());
        let events = decoder.feed(tail);
        assert_eq!(events.len(), 1);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_decoder_handles_multiple_lines_per_chunk() {
        let mut chunk = String::new();
        for seq in 1..=3 {
            chunk.push_str(
                &event(seq, EventBody::progress(format!("step {}", seq)))
                    .encode_line()
                    .unwrap(),
            );
        }
        let mut decoder = LineDecoder::new();
        let events = decoder.feed(&chunk);
        assert_eq!(
            events.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_decoder_tolerates_unknown_fields() {
        let line = format!(
            "{{\"job_id\":\"{}\",\"seq\":1,\"type\":\"progress\",\"message\":\"hi\",\"extra\":true}}\n",
            Uuid::nil()
        );
        let mut decoder = LineDecoder::new();
        assert_eq!(decoder.feed(&line).len(), 1);
    }

    #[test]
    fn test_terminal_classification() {
        assert!(EventBody::Result {
            files: vec![],
            log: None
        }
        .is_terminal());
        assert!(EventBody::Error {
            message: "boom".to_string(),
            log: None
        }
        .is_terminal());
        assert!(!EventBody::progress("working").is_terminal());
    }
}
