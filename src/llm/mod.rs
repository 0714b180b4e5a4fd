//! Generation providers via rig-core.
//!
//! Every provider sits behind the [`Generator`] trait and applies the same
//! fixed persona, so the worker never knows which one it is talking to.
//! The provider is chosen once at startup from [`Provider`].
//!
//! # Example
//! ```no_run
//! use chatq::llm::{Provider, generator};
//! use secrecy::SecretString;
//!
//! let key = SecretString::from("sk-ant-...");
//! let generator = generator(Provider::Anthropic, &key, "claude-3-5-sonnet-20240620")
//!     .expect("failed to create Anthropic client");
//! ```

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::{CompletionModel, Prompt};
use secrecy::{ExposeSecret, SecretString};
use tracing::{Instrument, debug, warn};

use crate::error::{Error, Result};
use crate::telemetry::genai::start_chat_span;

/// System instruction applied to every request, whatever the provider.
pub const PERSONA: &str = "You are Stan and you are an insufferable Tech Bro. \
Be very bro and techy in your replies. Do not ask questions, only answer them. \
Write only your dialogue. Do not write descriptions of actions. \
Write only one sentence max.";

/// Anthropic requires an explicit output budget.
const ANTHROPIC_MAX_TOKENS: u64 = 200;

/// Turns a submitter's text into a reply.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a reply for `text`.
    ///
    /// # Errors
    /// Provider errors and blank replies are both [`Error::Generation`];
    /// an empty string is never returned as success.
    async fn complete(&self, text: &str) -> Result<String>;
}

/// Which text-generation service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "chatgpt" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(Error::Config(format!(
                "unsupported generation provider '{other}' (expected openai or anthropic)"
            ))),
        }
    }
}

/// A rig agent preloaded with the persona.
pub struct RigGenerator<M: CompletionModel> {
    agent: Agent<M>,
    provider: Provider,
    model: String,
}

impl<M: CompletionModel> RigGenerator<M> {
    pub fn new(agent: Agent<M>, provider: Provider, model: impl Into<String>) -> Self {
        Self {
            agent,
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl<M> Generator for RigGenerator<M>
where
    M: CompletionModel + 'static,
{
    async fn complete(&self, text: &str) -> Result<String> {
        let span = start_chat_span(&self.model, self.provider.as_str());
        async {
            debug!(chars = text.len(), "sending prompt");
            let reply = self
                .agent
                .prompt(text)
                .await
                .map_err(|e| Error::Generation(format!("{} request failed: {e}", self.provider)))?;
            non_empty_reply(self.provider, reply)
        }
        .instrument(span)
        .await
    }
}

/// Trim a provider reply, rejecting blank ones.
pub fn non_empty_reply(provider: Provider, reply: String) -> Result<String> {
    let reply = reply.trim();
    if reply.is_empty() {
        warn!(%provider, "received an empty reply");
        return Err(Error::Generation(format!("{provider} returned an empty reply")));
    }
    Ok(reply.to_string())
}

/// Build the generator for the configured provider.
///
/// # Errors
/// Returns [`Error::Config`] if the provider client cannot be constructed.
pub fn generator(
    provider: Provider,
    api_key: &SecretString,
    model: &str,
) -> Result<Arc<dyn Generator>> {
    let client_error =
        |e: rig::http_client::Error| Error::Config(format!("failed to create {provider} client: {e}"));

    let generator: Arc<dyn Generator> = match provider {
        Provider::OpenAi => {
            let client: rig::providers::openai::Client =
                rig::providers::openai::Client::new(api_key.expose_secret()).map_err(client_error)?;
            let agent = client.agent(model).preamble(PERSONA).build();
            Arc::new(RigGenerator::new(agent, provider, model))
        }
        Provider::Anthropic => {
            let client: rig::providers::anthropic::Client =
                rig::providers::anthropic::Client::new(api_key.expose_secret())
                    .map_err(client_error)?;
            let agent = client
                .agent(model)
                .preamble(PERSONA)
                .max_tokens(ANTHROPIC_MAX_TOKENS)
                .temperature(0.0)
                .build();
            Arc::new(RigGenerator::new(agent, provider, model))
        }
    };

    debug!(%provider, model, "generator ready");
    Ok(generator)
}
