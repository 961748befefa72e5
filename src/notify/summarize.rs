// Transcript summarization.
//
// Posts the recording audio inline (base64) with a fixed instruction
// prompt and a strict JSON response schema, then decodes the model's
// reply into a `SessionSummary`. Requested explicitly by the user per
// session; never part of the capture path.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use crate::session::{Emotion, SessionSummary, SummarySegment};

use super::{check_status, NotifyError};

const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

const INSTRUCTION_PROMPT: &str = "Transcribe this audio recording of a possible emergency. \
Produce a short overall summary, then one segment per utterance with the speaker label, \
a mm:ss timestamp, the spoken text, its language name and BCP-47 code, an English \
translation when the text is not English, and the speaker's emotion. \
Respond only with JSON matching the response schema.";

pub struct TranscriptClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl TranscriptClient {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string(), api_key)
    }

    pub fn with_endpoint(endpoint: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }

    /// Summarize one recording. `mime_type` describes the audio blob
    /// (`audio/mp4` for the recorder's output).
    pub async fn summarize(
        &self,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<SessionSummary, NotifyError> {
        let request = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": INSTRUCTION_PROMPT },
                    { "inline_data": { "mime_type": mime_type, "data": BASE64.encode(audio) } },
                ],
            }],
            "generationConfig": {
                "response_mime_type": "application/json",
                "response_schema": response_schema(),
            },
        });

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;
        let reply: GenerateReply = check_status(response).await?.json().await?;

        let text = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| NotifyError::Decode("empty model reply".into()))?;

        decode_summary(&text)
    }
}

/// Schema the model must answer with; mirrors `WireSummary` below.
fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "segments": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "speaker": { "type": "string" },
                        "timestamp": { "type": "string" },
                        "content": { "type": "string" },
                        "language": { "type": "string" },
                        "language_code": { "type": "string" },
                        "translation": { "type": "string" },
                        "emotion": {
                            "type": "string",
                            "enum": ["happy", "sad", "angry", "neutral"],
                        },
                    },
                    "required": [
                        "speaker", "timestamp", "content",
                        "language", "language_code", "emotion",
                    ],
                },
            },
        },
        "required": ["summary", "segments"],
    })
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct WireSummary {
    summary: String,
    #[serde(default)]
    segments: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    speaker: String,
    timestamp: String,
    content: String,
    language: String,
    language_code: String,
    #[serde(default)]
    translation: Option<String>,
    emotion: Emotion,
}

fn decode_summary(text: &str) -> Result<SessionSummary, NotifyError> {
    let wire: WireSummary =
        serde_json::from_str(text).map_err(|e| NotifyError::Decode(e.to_string()))?;
    Ok(SessionSummary {
        overall_summary: wire.summary,
        segments: wire
            .segments
            .into_iter()
            .map(|segment| SummarySegment {
                speaker: segment.speaker,
                timestamp_label: segment.timestamp,
                text: segment.content,
                language: segment.language,
                language_code: segment.language_code,
                translation: segment.translation,
                emotion: segment.emotion,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_summary_maps_wire_fields() {
        let text = r#"{
            "summary": "Caller reports being followed",
            "segments": [{
                "speaker": "Speaker 1",
                "timestamp": "00:12",
                "content": "Ayudame por favor",
                "language": "Spanish",
                "language_code": "es",
                "translation": "Help me please",
                "emotion": "sad"
            }]
        }"#;

        let summary = decode_summary(text).unwrap();
        assert_eq!(summary.overall_summary, "Caller reports being followed");
        let segment = &summary.segments[0];
        assert_eq!(segment.text, "Ayudame por favor");
        assert_eq!(segment.timestamp_label, "00:12");
        assert_eq!(segment.translation.as_deref(), Some("Help me please"));
        assert_eq!(segment.emotion, Emotion::Sad);
    }

    #[test]
    fn test_decode_summary_rejects_unknown_emotion() {
        let text = r#"{
            "summary": "s",
            "segments": [{
                "speaker": "S", "timestamp": "0:00", "content": "c",
                "language": "English", "language_code": "en", "emotion": "terrified"
            }]
        }"#;
        assert!(matches!(
            decode_summary(text),
            Err(NotifyError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_summary_rejects_non_json() {
        assert!(matches!(
            decode_summary("sorry, I cannot"),
            Err(NotifyError::Decode(_))
        ));
    }
}
