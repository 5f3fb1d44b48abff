//! Format des messages JSON échangés avec le service
//!
//! Sortant :
//! - `{"setup": {...}}` une fois, juste après le handshake
//! - `{"realtimeInput": {"audio": {"mimeType": "...", "data": "<base64>"}}}` par frame micro
//!
//! Entrant :
//! - `{"setupComplete": {}}` : la session est prête
//! - `{"serverContent": {...}}` : audio, transcriptions, interruption, fin de tour
//! - `{"goAway": {...}}` : le service va fermer la session
//!
//! Les champs inconnus sont ignorés ; un message entrant illisible est une
//! erreur locale au message, jamais une erreur de session.

use serde::{Deserialize, Serialize};

use crate::{InlineAudio, NetworkError, NetworkResult, ServerMessage, SessionSetup, TranscriptFragment};
use audio::EncodedFrame;

// ----- Messages sortants -----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum ClientMessage<'a> {
    Setup(SetupPayload<'a>),
    RealtimeInput(RealtimeInputPayload<'a>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetupPayload<'a> {
    model: &'a str,
    generation_config: GenerationConfig<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<Empty>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    language_code: &'a str,
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
struct RealtimeInputPayload<'a> {
    audio: OutgoingBlob<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingBlob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

/// Sérialise le message de configuration de session
pub fn encode_setup(setup: &SessionSetup) -> NetworkResult<String> {
    let message = ClientMessage::Setup(SetupPayload {
        model: &setup.model,
        generation_config: GenerationConfig {
            response_modalities: ["AUDIO"],
            speech_config: SpeechConfig {
                language_code: &setup.language_code,
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: &setup.voice_name },
                },
            },
        },
        system_instruction: setup
            .system_instruction
            .as_deref()
            .map(|text| Content { parts: [TextPart { text }] }),
        input_audio_transcription: setup.input_transcription.then_some(Empty {}),
        output_audio_transcription: setup.output_transcription.then_some(Empty {}),
    });
    Ok(serde_json::to_string(&message)?)
}

/// Sérialise une frame micro
pub fn encode_realtime_input(frame: &EncodedFrame) -> NetworkResult<String> {
    let message = ClientMessage::RealtimeInput(RealtimeInputPayload {
        audio: OutgoingBlob {
            mime_type: &frame.mime_type,
            data: &frame.data,
        },
    });
    Ok(serde_json::to_string(&message)?)
}

// ----- Messages entrants -----

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ServerFrame {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    go_away: Option<GoAway>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    interrupted: bool,
    turn_complete: bool,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ModelTurn {
    parts: Vec<Part>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Part {
    inline_data: Option<IncomingBlob>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingBlob {
    mime_type: Option<String>,
    data: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Transcription {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GoAway {
    time_left: Option<String>,
}

/// Message entrant interprété
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingFrame {
    /// La configuration est acceptée, la session est ouverte
    SetupComplete,
    Content(ServerMessage),
    /// Fermeture annoncée, avec le délai restant s'il est donné
    GoAway(Option<String>),
    /// Message valide mais sans intérêt pour la session
    Ignored,
}

/// Interprète un message texte du service
///
/// # Erreurs
/// - `NetworkError::InvalidMessage` si le JSON est illisible
pub fn parse_server_frame(text: &str) -> NetworkResult<IncomingFrame> {
    let frame: ServerFrame =
        serde_json::from_str(text).map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;

    if frame.setup_complete.is_some() {
        return Ok(IncomingFrame::SetupComplete);
    }
    if let Some(go_away) = frame.go_away {
        return Ok(IncomingFrame::GoAway(go_away.time_left));
    }
    let Some(content) = frame.server_content else {
        return Ok(IncomingFrame::Ignored);
    };

    let mut message = ServerMessage {
        interrupted: content.interrupted,
        turn_complete: content.turn_complete,
        ..Default::default()
    };

    if let Some(turn) = content.model_turn {
        message.audio = turn
            .parts
            .into_iter()
            .filter_map(|part| part.inline_data)
            .map(|blob| InlineAudio { mime_type: blob.mime_type, data: blob.data })
            .collect();
    }

    let transcripts = [
        (content.input_transcription, true),
        (content.output_transcription, false),
    ];
    for (transcription, from_user) in transcripts {
        let Some(text) = transcription.and_then(|t| t.text) else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        message.transcripts.push(if from_user {
            TranscriptFragment::user(text)
        } else {
            TranscriptFragment::assistant(text)
        });
    }

    if message.is_empty() {
        return Ok(IncomingFrame::Ignored);
    }
    Ok(IncomingFrame::Content(message))
}
