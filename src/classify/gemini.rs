// src/classify/gemini.rs
//! Concrete classification oracles: Gemini `generateContent`, a fixed-answer
//! mock for tests/local runs, and a disabled oracle that always errors.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

use super::{ClassifierOracle, DynOracle};
use crate::config::monitor::ClassifierConfig;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Factory: build the oracle named in config.
///
/// * `mock` returns a deterministic relevant answer.
/// * `disabled` errors on every call, so every candidate is dropped.
/// * `gemini` needs a resolved api key.
pub fn build_oracle_from_config(cfg: &ClassifierConfig) -> anyhow::Result<DynOracle> {
    match cfg.provider.as_str() {
        "mock" => Ok(Arc::new(MockOracle::relevant())),
        "disabled" => Ok(Arc::new(DisabledOracle)),
        "gemini" => Ok(Arc::new(GeminiOracle::new(cfg)?)),
        other => bail!("unsupported classifier provider: {other}"),
    }
}

pub struct GeminiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiOracle {
    pub fn new(cfg: &ClassifierConfig) -> anyhow::Result<Self> {
        if cfg.api_key.trim().is_empty() {
            bail!("gemini classifier requires an api key");
        }
        let http = reqwest::Client::builder()
            .user_agent("eth-feed-monitor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building gemini http client")?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_output_tokens: cfg.max_output_tokens,
        })
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerationConfig {
            temperature: f32,
            max_output_tokens: u32,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenerationConfig,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Option<RespContent>,
        }
        #[derive(Deserialize)]
        struct RespContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            #[serde(default)]
            text: String,
        }

        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let resp = self
            .http
            .post(format!("{GEMINI_BASE}/{}:generateContent", self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await
            .context("gemini request")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("gemini returned {status}");
        }
        let body: Resp = resp.json().await.context("gemini response json")?;
        let text = body
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(anyhow!("gemini returned no text"));
        }
        Ok(text)
    }
}

impl ClassifierOracle for GeminiOracle {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(self.generate(prompt))
    }
    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Always errors; used when classification is switched off.
pub struct DisabledOracle;

impl ClassifierOracle for DisabledOracle {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async { Err(anyhow!("classifier disabled")) })
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Returns the same raw answer for every prompt.
#[derive(Clone)]
pub struct MockOracle {
    pub fixed: String,
}

impl MockOracle {
    pub fn relevant() -> Self {
        Self {
            fixed: "```json\n{\"sentiment\":\"neutral\",\"topics\":[\"Defi\"],\"impact\":\"medium\",\"summary\":\"mock\"}\n```"
                .to_string(),
        }
    }
}

impl ClassifierOracle for MockOracle {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}
