//! JSON messages of the provider's live and content APIs.
//!
//! Field names follow the provider's camelCase wire format. Unknown inbound
//! fields are ignored so protocol additions don't break parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::frame::pcm_mime_type;
use crate::{
    DecodeError, EncodedFrame, ResponseModality, SessionConfig, TransportError,
    PLAYBACK_SAMPLE_RATE,
};

/// A message from the client to the live endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session parameters; must be the first message.
    Setup(Setup),
    /// Streaming media input.
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    /// Builds the setup message for a session.
    pub fn setup(config: &SessionConfig) -> Self {
        Self::Setup(Setup::from_config(config))
    }

    /// Wraps one audio frame as realtime input.
    pub fn audio(frame: &EncodedFrame) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![frame.clone()],
        })
    }

    /// Serializes the message to JSON text.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if serialization fails.
    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::protocol(e.to_string()))
    }
}

/// The `setup` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model name (`models/<id>`).
    pub model: String,
    /// Output configuration.
    pub generation_config: GenerationConfig,
    /// System instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl Setup {
    /// Builds the payload from session parameters.
    pub fn from_config(config: &SessionConfig) -> Self {
        let system_instruction = (!config.system_instruction.is_empty())
            .then(|| Content::text(None, config.system_instruction.clone()));
        Self {
            model: config.qualified_model(),
            generation_config: GenerationConfig {
                response_modalities: vec![config.response_modality],
                speech_config: Some(SpeechConfig::prebuilt(&config.voice)),
            },
            system_instruction,
        }
    }
}

/// Generation settings for the live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Requested response modalities.
    pub response_modalities: Vec<ResponseModality>,
    /// Voice settings for audio responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

/// `speechConfig`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Voice selection.
    pub voice_config: VoiceSelection,
}

impl SpeechConfig {
    /// Selects a prebuilt voice by name.
    pub fn prebuilt(voice: &str) -> Self {
        Self {
            voice_config: VoiceSelection {
                prebuilt_voice_config: PrebuiltVoice {
                    voice_name: voice.to_string(),
                },
            },
        }
    }
}

/// `voiceConfig`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSelection {
    /// The prebuilt voice.
    pub prebuilt_voice_config: PrebuiltVoice,
}

/// `prebuiltVoiceConfig`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoice {
    /// Voice name, e.g. `Zephyr`.
    pub voice_name: String,
}

/// The `realtimeInput` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    /// Media chunks, in order.
    pub media_chunks: Vec<EncodedFrame>,
}

/// A turn of content: a role and its parts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// `user` or `model`; absent for system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parts of the turn.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Creates a single-part text turn.
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenates the text of all parts, skipping reasoning parts.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter(|p| p.thought != Some(true))
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

/// One part of a turn: text or inline media.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Inline media such as model audio.
    ///
    /// Kept as raw JSON so one malformed part doesn't reject the whole
    /// message; see [`Part::audio_frame()`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Value>,
    /// Set on reasoning parts of thinking models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Creates an inline media part.
    pub fn inline(frame: EncodedFrame) -> Self {
        Self {
            inline_data: Some(serde_json::json!({
                "mimeType": frame.mime_type,
                "data": frame.data,
            })),
            ..Default::default()
        }
    }

    /// Reads the inline media as an encoded frame.
    ///
    /// Returns `None` for parts without inline media. A missing `mimeType`
    /// is taken to be PCM at the playback rate.
    pub fn audio_frame(&self) -> Option<Result<EncodedFrame, DecodeError>> {
        let inline = self.inline_data.as_ref()?;
        Some(decode_inline(inline))
    }
}

fn decode_inline(inline: &Value) -> Result<EncodedFrame, DecodeError> {
    let malformed = |reason: &str| DecodeError::Malformed {
        reason: reason.to_string(),
    };
    let Value::Object(fields) = inline else {
        return Err(malformed("inlineData is not an object"));
    };
    let data = match fields.get("data") {
        Some(Value::String(data)) => data.clone(),
        Some(_) => return Err(malformed("data is not a string")),
        None => return Err(malformed("missing data")),
    };
    let mime_type = match fields.get("mimeType") {
        Some(Value::String(mime_type)) => mime_type.clone(),
        None | Some(Value::Null) => pcm_mime_type(PLAYBACK_SAMPLE_RATE),
        Some(_) => return Err(malformed("mimeType is not a string")),
    };
    Ok(EncodedFrame { mime_type, data })
}

/// A message from the live endpoint.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Present (usually `{}`) when the session is accepted.
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    /// Model output and turn signals.
    #[serde(default)]
    pub server_content: Option<ServerContent>,
}

/// `serverContent`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Model output for the current turn.
    #[serde(default)]
    pub model_turn: Option<Content>,
    /// The user barged in; queued model audio is stale.
    #[serde(default)]
    pub interrupted: bool,
    /// The model finished its turn.
    #[serde(default)]
    pub turn_complete: bool,
}

impl ServerMessage {
    /// Parses a message from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for invalid JSON.
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(|e| TransportError::protocol(e.to_string()))
    }

    /// A message carrying model audio.
    pub fn audio(frames: impl IntoIterator<Item = EncodedFrame>) -> Self {
        Self {
            setup_complete: None,
            server_content: Some(ServerContent {
                model_turn: Some(Content {
                    role: Some("model".to_string()),
                    parts: frames.into_iter().map(Part::inline).collect(),
                }),
                ..Default::default()
            }),
        }
    }

    /// An interruption signal.
    pub fn interrupted() -> Self {
        Self {
            setup_complete: None,
            server_content: Some(ServerContent {
                interrupted: true,
                ..Default::default()
            }),
        }
    }

    /// Returns `true` if this confirms the session setup.
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Returns `true` if the model's turn was interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.interrupted)
    }

    /// Returns `true` if the model finished its turn.
    pub fn is_turn_complete(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.turn_complete)
    }

    /// Returns the inline audio frames of the model turn, in order.
    ///
    /// Each malformed part yields its own error so the rest still play.
    pub fn audio_chunks(&self) -> Vec<Result<EncodedFrame, DecodeError>> {
        self.server_content
            .as_ref()
            .and_then(|c| c.model_turn.as_ref())
            .map(|turn| turn.parts.iter().filter_map(Part::audio_frame).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_wire_shape() {
        let config = SessionConfig {
            model: "live-model".to_string(),
            voice: "Zephyr".to_string(),
            system_instruction: "Be brief.".to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(ClientMessage::setup(&config)).unwrap();

        assert_eq!(
            value,
            json!({
                "setup": {
                    "model": "models/live-model",
                    "generationConfig": {
                        "responseModalities": ["AUDIO"],
                        "speechConfig": {
                            "voiceConfig": {
                                "prebuiltVoiceConfig": { "voiceName": "Zephyr" }
                            }
                        }
                    },
                    "systemInstruction": { "parts": [{ "text": "Be brief." }] }
                }
            })
        );
    }

    #[test]
    fn test_realtime_input_wire_shape() {
        let frame = EncodedFrame::pcm("AAA=".to_string(), 16_000);
        let value = serde_json::to_value(ClientMessage::audio(&frame)).unwrap();
        assert_eq!(
            value,
            json!({
                "realtimeInput": {
                    "mediaChunks": [{ "mimeType": "audio/pcm;rate=16000", "data": "AAA=" }]
                }
            })
        );
    }

    #[test]
    fn test_parse_setup_complete() {
        let msg = ServerMessage::parse(r#"{"setupComplete":{}}"#).unwrap();
        assert!(msg.is_setup_complete());
        assert!(msg.audio_chunks().is_empty());
    }

    #[test]
    fn test_parse_model_audio() {
        let text = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } },
                        { "text": "hello" },
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQAB" } }
                    ]
                }
            }
        }"#;
        let msg = ServerMessage::parse(text).unwrap();
        let chunks = msg.audio_chunks();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap().data, "AAAA");
        assert_eq!(chunks[1].as_ref().unwrap().data, "AQAB");
        assert!(!msg.is_interrupted());
    }

    #[test]
    fn test_parse_inline_data_without_mime_type() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"data":"AAAA"}}]}}}"#;
        let msg = ServerMessage::parse(text).unwrap();
        let chunks = msg.audio_chunks();
        assert_eq!(chunks.len(), 1);
        let frame = chunks[0].as_ref().unwrap();
        assert_eq!(frame.mime_type, "audio/pcm;rate=24000");
        assert_eq!(frame.data, "AAAA");
    }

    #[test]
    fn test_malformed_inline_part_keeps_valid_parts() {
        let text = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } },
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": 42 } },
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000" } },
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQAB" } }
                    ]
                }
            }
        }"#;
        let msg = ServerMessage::parse(text).unwrap();
        let chunks = msg.audio_chunks();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].as_ref().unwrap().data, "AAAA");
        assert!(matches!(chunks[1], Err(DecodeError::Malformed { .. })));
        assert!(matches!(chunks[2], Err(DecodeError::Malformed { .. })));
        assert_eq!(chunks[3].as_ref().unwrap().data, "AQAB");
    }

    #[test]
    fn test_inline_part_wire_shape() {
        let part = Part::inline(EncodedFrame::pcm("AAAA".to_string(), 24_000));
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            json!({ "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } })
        );
        assert_eq!(part.audio_frame().unwrap().unwrap().data, "AAAA");
    }

    #[test]
    fn test_parse_interrupted_and_unknown_fields() {
        let text = r#"{"serverContent":{"interrupted":true},"usageMetadata":{"totalTokenCount":3}}"#;
        let msg = ServerMessage::parse(text).unwrap();
        assert!(msg.is_interrupted());
        assert!(!msg.is_turn_complete());
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = ServerMessage::parse("not json").unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
    }

    #[test]
    fn test_content_joined_text() {
        let content = Content {
            role: Some("model".to_string()),
            parts: vec![Part::text("Hello, "), Part::text("world")],
        };
        assert_eq!(content.joined_text(), "Hello, world");
    }
}
