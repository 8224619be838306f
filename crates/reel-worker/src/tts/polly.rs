use async_trait::async_trait;
use reel_media::{remove_file_quietly, JobContext, Transcoder};
use reel_models::TtsEngine;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::VoiceEngine;
use crate::config::VoiceConfig;
use crate::error::SynthesisError;
use crate::providers::{reset_delay_secs, retry_after_secs};

/// Longest text the Polly proxy accepts per request.
const MAX_CHUNK_CHARS: usize = 550;

pub const POLLY_VOICES: &[&str] = &[
    "Brian", "Emma", "Russell", "Joey", "Matthew", "Joanna", "Kimberly", "Amy", "Geraint",
    "Nicole", "Justin", "Ivy", "Kendra", "Salli", "Raveena",
];

#[derive(Debug, Deserialize)]
struct SpeakResponse {
    speak_url: Option<String>,
}

/// Split text into chunks of at most `max_chars`, breaking between sentences
/// where possible and between words otherwise.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sentences: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in normalized.split(' ').filter(|w| !w.is_empty()) {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        if word.ends_with(['.', '!', '?']) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut chunk = String::new();
    for piece in sentences.iter().flat_map(|s| split_long(s, max_chars)) {
        let len = chunk.chars().count();
        if len > 0 && len + 1 + piece.chars().count() > max_chars {
            chunks.push(std::mem::take(&mut chunk));
        }
        if !chunk.is_empty() {
            chunk.push(' ');
        }
        chunk.push_str(&piece);
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

/// Break one sentence into pieces no longer than `max_chars`.
fn split_long(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for word in sentence.split(' ') {
        let chars: Vec<char> = word.chars().collect();
        for part in chars.chunks(max_chars) {
            let part: String = part.iter().collect();
            let len = piece.chars().count();
            if len > 0 && len + 1 + part.chars().count() > max_chars {
                pieces.push(std::mem::take(&mut piece));
            }
            if !piece.is_empty() {
                piece.push(' ');
            }
            piece.push_str(&part);
        }
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

/// Amazon Polly voices through the Streamlabs proxy.
pub struct PollyEngine {
    client: Client,
    url: String,
    transcoder: Arc<dyn Transcoder>,
}

impl PollyEngine {
    pub fn new(client: Client, config: &VoiceConfig, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            client,
            url: config.polly_url.clone(),
            transcoder,
        }
    }

    async fn speak_chunk(
        &self,
        text: &str,
        voice: &str,
        output: &Path,
        ctx: &JobContext,
    ) -> Result<(), SynthesisError> {
        ctx.run(async {
            let response = self
                .client
                .post(&self.url)
                .header(reqwest::header::REFERER, "https://streamlabs.com/")
                .form(&[("voice", voice), ("text", text), ("service", "polly")])
                .send()
                .await?;

            let status = response.status();
            if status.as_u16() == 429 {
                let retry_after = retry_after_secs(response.headers(), "X-RateLimit-Reset")
                    .map(|reset| reset_delay_secs(reset, chrono::Utc::now().timestamp()));
                return Err(SynthesisError::RateLimited {
                    engine: TtsEngine::StreamlabsPolly,
                    retry_after,
                });
            }
            if !status.is_success() {
                return Err(SynthesisError::engine(
                    TtsEngine::StreamlabsPolly,
                    format!("speak request returned {status}"),
                    status.is_server_error(),
                ));
            }

            let speak_url = response
                .json::<SpeakResponse>()
                .await
                .ok()
                .and_then(|r| r.speak_url)
                .ok_or_else(|| {
                    SynthesisError::engine(
                        TtsEngine::StreamlabsPolly,
                        "response had no speak_url",
                        true,
                    )
                })?;

            let audio = self
                .client
                .get(&speak_url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            tokio::fs::write(output, &audio).await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl VoiceEngine for PollyEngine {
    fn id(&self) -> TtsEngine {
        TtsEngine::StreamlabsPolly
    }

    fn default_voice(&self) -> &str {
        "Brian"
    }

    fn resolve_voice(&self, voice: Option<&str>) -> Result<String, SynthesisError> {
        let Some(requested) = voice.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(self.default_voice().to_string());
        };
        POLLY_VOICES
            .iter()
            .find(|v| v.eq_ignore_ascii_case(requested))
            .map(|v| v.to_string())
            .ok_or_else(|| SynthesisError::InvalidVoice {
                engine: self.id(),
                voice: requested.to_string(),
            })
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        output: &Path,
        ctx: &JobContext,
    ) -> Result<(), SynthesisError> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(SynthesisError::engine(self.id(), "no text to speak", false));
        }
        let dir = output.parent().unwrap_or_else(|| Path::new("."));

        let mut parts: Vec<PathBuf> = Vec::with_capacity(chunks.len());
        let mut result = Ok(());
        for (i, chunk) in chunks.iter().enumerate() {
            let part = dir.join(format!("polly_part_{i}.mp3"));
            result = self.speak_chunk(chunk, voice, &part, ctx).await;
            parts.push(part);
            if result.is_err() {
                break;
            }
        }

        if result.is_ok() {
            debug!(chunks = parts.len(), "Joining Polly chunks");
            result = match parts.as_slice() {
                [single] => tokio::fs::rename(single, output).await.map_err(SynthesisError::from),
                _ => self
                    .transcoder
                    .concat_audio(&parts, output, ctx)
                    .await
                    .map_err(SynthesisError::from),
            };
        }

        for part in &parts {
            remove_file_quietly(part).await;
        }
        result
    }
}
