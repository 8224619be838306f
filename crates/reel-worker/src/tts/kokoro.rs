use async_trait::async_trait;
use reel_media::JobContext;
use reel_models::TtsEngine;
use reqwest::Client;
use serde::Serialize;
use std::path::Path;

use super::VoiceEngine;
use crate::config::VoiceConfig;
use crate::error::SynthesisError;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Self-hosted Kokoro server speaking the OpenAI speech API.
pub struct KokoroEngine {
    client: Client,
    endpoint: String,
}

impl KokoroEngine {
    pub fn new(client: Client, config: &VoiceConfig) -> Self {
        Self {
            client,
            endpoint: format!("{}/v1/audio/speech", config.kokoro_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl VoiceEngine for KokoroEngine {
    fn id(&self) -> TtsEngine {
        TtsEngine::Kokoro
    }

    fn default_voice(&self) -> &str {
        "af_sarah"
    }

    fn has_native_timing(&self) -> bool {
        false
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        output: &Path,
        ctx: &JobContext,
    ) -> Result<(), SynthesisError> {
        let request = SpeechRequest {
            model: "kokoro",
            input: text,
            voice,
            response_format: "mp3",
        };

        ctx.run(async {
            let response = self.client.post(&self.endpoint).json(&request).send().await?;
            let status = response.status();
            if status.as_u16() == 429 {
                return Err(SynthesisError::RateLimited {
                    engine: TtsEngine::Kokoro,
                    retry_after: None,
                });
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SynthesisError::engine(
                    TtsEngine::Kokoro,
                    format!("speech request returned {status}: {}", body.trim()),
                    status.is_server_error(),
                ));
            }

            let audio = response.bytes().await?;
            tokio::fs::write(output, &audio).await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Retryable;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine(server: &MockServer) -> KokoroEngine {
        let config = VoiceConfig {
            kokoro_url: format!("{}/", server.uri()),
            ..VoiceConfig::default()
        };
        KokoroEngine::new(Client::new(), &config)
    }

    #[tokio::test]
    async fn test_writes_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(body_partial_json(serde_json::json!({"voice": "af_sarah", "input": "Hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp3".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("narration.mp3");
        engine(&server)
            .synthesize("Hi", "af_sarah", &output, &JobContext::background())
            .await
            .unwrap();
        assert_eq!(std::fs::read(output).unwrap(), b"mp3");
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad voice"))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let err = engine(&server)
            .synthesize("Hi", "nobody", &dir.path().join("n.mp3"), &JobContext::background())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("bad voice"));
    }
}
