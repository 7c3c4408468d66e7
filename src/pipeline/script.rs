//! Transformation: combined page text → narrated lesson script.
//!
//! All prompt engineering lives in [`crate::prompts`]; this module owns the
//! provider call, its timeout, and response validation.
//!
//! Each job makes exactly one call. A failed or timed-out call fails the job.

use super::extract::ExtractedPage;
use crate::config::{PageRange, TransformConfig};
use crate::error::{LessonError, Result};
use crate::prompts::{user_message, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{
    AnthropicProvider, ChatMessage, CompletionOptions, GeminiProvider, LLMProvider,
    OpenAIProvider, OpenRouterProvider, ProviderType,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Substituted when the combined text is empty, i.e. the range has no pages.
pub const PLACEHOLDER_TEXT: &str = "No extractable text found for the selected pages.";

/// Join page texts as `[Page N]` sections separated by blank lines.
///
/// The result is trimmed; if nothing remains, [`PLACEHOLDER_TEXT`] is returned
/// so the transformation still receives a meaningful input.
pub fn combine_pages(pages: &[ExtractedPage]) -> String {
    let combined = pages
        .iter()
        .map(|p| format!("[Page {}]\n{}", p.page_number, p.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let combined = combined.trim();
    if combined.is_empty() {
        PLACEHOLDER_TEXT.to_string()
    } else {
        combined.to_string()
    }
}

/// Turns combined page text into a lesson script.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write_script(&self, combined_text: &str, range: PageRange) -> Result<String>;
}

/// [`ScriptWriter`] backed by an `edgequake_llm` chat provider.
pub struct LlmScriptWriter {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl std::fmt::Debug for LlmScriptWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmScriptWriter")
            .field("provider", &"<dyn LLMProvider>")
            .field("temperature", &self.options.temperature)
            .field("max_tokens", &self.options.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmScriptWriter {
    /// Build a writer from config.
    ///
    /// Resolution order:
    /// 1. **Pre-built provider** (`config.provider`): used as-is.
    /// 2. **Named provider + model**: the client is constructed from
    ///    `config.api_key`; without one this fails immediately with
    ///    [`LessonError::ProviderNotConfigured`], before any job is attempted.
    pub fn from_config(config: &TransformConfig) -> Result<Self> {
        let provider = match &config.provider {
            Some(provider) => Arc::clone(provider),
            None => build_provider(config)?,
        };

        Ok(Self::with_provider(provider, config))
    }

    /// Use `provider` with the prompt and sampling settings from `config`.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: &TransformConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

/// Environment variable a provider's credential is conventionally read from.
///
/// Only the binary consults the environment; the library takes the key from
/// [`TransformConfig::api_key`].
pub fn credential_env_var(provider_name: &str) -> Option<&'static str> {
    match ProviderType::from_str(provider_name)? {
        ProviderType::OpenAI => Some("OPENAI_API_KEY"),
        ProviderType::Anthropic => Some("ANTHROPIC_API_KEY"),
        ProviderType::Gemini => Some("GEMINI_API_KEY"),
        ProviderType::OpenRouter => Some("OPENROUTER_API_KEY"),
        _ => None,
    }
}

/// Construct the named provider with the configured key and model.
fn build_provider(config: &TransformConfig) -> Result<Arc<dyn LLMProvider>> {
    let not_configured = |hint: String| LessonError::ProviderNotConfigured {
        provider: config.provider_name.clone(),
        hint,
    };

    let Some(env_var) = credential_env_var(&config.provider_name) else {
        return Err(not_configured(
            "Supported providers: openai, anthropic, gemini, openrouter. \
             Others can be supplied pre-built via ServiceConfigBuilder::provider."
                .into(),
        ));
    };
    let key = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            not_configured(format!(
                "Set {env_var} (or pass --api-key) to enable script generation."
            ))
        })?;

    let model = config.model.as_str();
    let provider: Arc<dyn LLMProvider> = match ProviderType::from_str(&config.provider_name) {
        Some(ProviderType::Anthropic) => Arc::new(AnthropicProvider::new(key).with_model(model)),
        Some(ProviderType::Gemini) => Arc::new(GeminiProvider::new(key).with_model(model)),
        Some(ProviderType::OpenRouter) => Arc::new(OpenRouterProvider::new(key).with_model(model)),
        _ => Arc::new(OpenAIProvider::new(key).with_model(model)),
    };
    debug!("Script provider {} with model {}", config.provider_name, model);
    Ok(provider)
}

#[async_trait]
impl ScriptWriter for LlmScriptWriter {
    async fn write_script(&self, combined_text: &str, range: PageRange) -> Result<String> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(user_message(range, combined_text)),
        ];

        let start = Instant::now();
        let response = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| LessonError::TransformationTimeout {
            secs: self.timeout.as_secs(),
        })?
        .map_err(|e| LessonError::TransformationFailed {
            message: e.to_string(),
        })?;

        debug!(
            "Pages {}: {} input tokens, {} output tokens, {:?}",
            range,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let script = validate_script(response.content)?;
        info!("Generated {} char script for pages {}", script.len(), range);
        Ok(script)
    }
}

/// Reject responses with no usable content. Non-empty content is returned
/// verbatim.
pub fn validate_script(content: String) -> Result<String> {
    if content.trim().is_empty() {
        Err(LessonError::EmptyScript)
    } else {
        Ok(content)
    }
}

fn build_options(config: &TransformConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
