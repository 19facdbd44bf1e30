use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;

use crate::errors::MobiClawResult;
use crate::llm::provider::LlmProvider;
use crate::llm::registry::ProviderRegistry;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart, ImageUrl};
use crate::llm::{LanguageModel, ModelSource};

/// Synchronous face of an async [`LlmProvider`].
///
/// Each call is driven to completion on the injected runtime handle, so it
/// must be made from a thread that is not itself inside that runtime.
pub struct BlockingModel {
    provider: Arc<dyn LlmProvider>,
    cfg: CallConfig,
    handle: tokio::runtime::Handle,
}

impl BlockingModel {
    pub fn new(provider: Arc<dyn LlmProvider>, cfg: CallConfig, handle: tokio::runtime::Handle) -> Self {
        Self { provider, cfg, handle }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Read an image file into a `data:` URI.
pub fn image_data_uri(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime_for(path), b64))
}

/// One user message: the prompt text followed by every readable image.
pub fn build_user_message(prompt: &str, images: &[PathBuf]) -> ChatMessage {
    let mut parts = vec![ContentPart::Text {
        text: prompt.to_string(),
    }];
    for path in images {
        match image_data_uri(path) {
            Ok(url) => parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            }),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "image encoding failed"),
        }
    }
    ChatMessage::user_parts(parts)
}

impl LanguageModel for BlockingModel {
    fn generate(&self, prompt: &str, images: &[PathBuf]) -> String {
        let message = build_user_message(prompt, images);
        tracing::info!(
            provider = %self.provider.name(),
            model = %self.cfg.model,
            images = images.len(),
            "calling language model"
        );

        match self.handle.block_on(self.provider.chat(vec![message], &self.cfg)) {
            Ok(resp) => resp.content,
            Err(e) => {
                tracing::error!(provider = %self.provider.name(), error = %e, "language model call failed");
                String::new()
            }
        }
    }
}

/// [`ModelSource`] backed by the configured provider registry.
pub struct ModelHub {
    providers: ProviderRegistry,
    handle: tokio::runtime::Handle,
}

impl ModelHub {
    pub fn new(providers: ProviderRegistry, handle: tokio::runtime::Handle) -> Self {
        Self { providers, handle }
    }
}

impl ModelSource for ModelHub {
    fn model_for(&self, role: &str) -> MobiClawResult<Arc<dyn LanguageModel>> {
        let (provider, cfg) = self.providers.call_config_for_role(role)?;
        tracing::debug!(role = %role, provider = %provider.name(), model = %cfg.model, "model bound");
        Ok(Arc::new(BlockingModel::new(provider, cfg, self.handle.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MobiClawError;
    use crate::llm::types::{LlmResponse, MessageContent};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<ChatMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl LlmProvider for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> MobiClawResult<LlmResponse> {
            if self.fail {
                return Err(MobiClawError::LlmProvider("503".into()));
            }
            self.seen.lock().unwrap().extend(messages);
            Ok(LlmResponse {
                content: "{\"name\":\"done\"}".into(),
                reasoning: String::new(),
            })
        }
    }

    fn cfg() -> CallConfig {
        CallConfig {
            model: "m".into(),
            stream: false,
            temperature: 0.1,
            max_tokens: None,
        }
    }

    #[test]
    fn images_become_data_uris_and_missing_ones_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("s.png");
        image::RgbImage::new(2, 2).save(&shot).unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let provider = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail: false,
        });
        let model = BlockingModel::new(provider.clone(), cfg(), rt.handle().clone());

        let out = model.generate("hello", &[shot, dir.path().join("missing.png")]);
        assert_eq!(out, "{\"name\":\"done\"}");

        let seen = provider.seen.lock().unwrap();
        let MessageContent::Parts(parts) = &seen[0].content else {
            panic!("expected multipart content");
        };
        assert_eq!(parts.len(), 2);
        match &parts[1] {
            ContentPart::ImageUrl { image_url } => assert!(image_url.url.starts_with("data:image/png;base64,")),
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn provider_errors_become_empty_string() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let provider = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            fail: true,
        });
        let model = BlockingModel::new(provider, cfg(), rt.handle().clone());
        assert_eq!(model.generate("hi", &[]), "");
    }
}
