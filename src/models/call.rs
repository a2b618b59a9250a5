//! Call Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One transcript line of a call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptLine {
    pub role: String,
    pub text: String,
}

/// Persisted record of one call, sealed at teardown
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CallRecord {
    pub id: String,
    pub caller_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub cost_cents: f64,
    /// JSON array of transcript lines
    pub transcript: String,
    /// Captured log records of this call
    pub logs: String,
}

impl CallRecord {
    pub fn transcript_lines(&self) -> Vec<TranscriptLine> {
        serde_json::from_str(&self.transcript).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_roundtrip() {
        let lines = vec![
            TranscriptLine {
                role: "user".into(),
                text: "7234".into(),
            },
            TranscriptLine {
                role: "assistant".into(),
                text: "Zugang gewaehrt.".into(),
            },
        ];
        let record = CallRecord {
            id: "c1".into(),
            caller_id: Some("015901969502".into()),
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            cost_cents: 0.0,
            transcript: serde_json::to_string(&lines).unwrap(),
            logs: String::new(),
        };
        assert_eq!(record.transcript_lines(), lines);
    }

    #[test]
    fn test_malformed_transcript_yields_empty() {
        let record = CallRecord {
            id: "c1".into(),
            caller_id: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            cost_cents: 0.0,
            transcript: "not json".into(),
            logs: String::new(),
        };
        assert!(record.transcript_lines().is_empty());
    }
}
