//! Chat-completions semantic arbiter
//!
//! Asks an OpenAI-compatible chat-completions endpoint whether two hotel
//! records describe the same establishment.
//!
//! Expected reply format:
//! ```text
//! Verdict: MATCH | NO_MATCH | UNSURE
//! Confidence: <0-100>
//! Explanation: <one sentence>
//! ```
//! The older `Similarity: <0-100>` reply is also understood. A reply with
//! neither line is Inconclusive; no score is ever invented.

use super::{ArbitrationRequest, SemanticArbiter};
use crate::error::MatchError;
use crate::types::{ArbiterOpinion, Dimension, Judgement};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::num::NonZeroU32;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const USER_AGENT: &str = concat!("hmap-er/", env!("CARGO_PKG_VERSION"));
const SYSTEM_PROMPT: &str =
    "You compare hotel records and decide whether they describe the same hotel.";

/// Connection settings for the arbiter
#[derive(Debug, Clone, PartialEq)]
pub struct ArbiterSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub requests_per_second: u32,
    /// HTTP total timeout; the router applies its own bound on top
    pub request_timeout: Duration,
}

impl ArbiterSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            max_tokens: 150,
            requests_per_second: 3,
            request_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions arbiter with a client-side rate limit
pub struct ChatCompletionsArbiter {
    client: Client,
    settings: ArbiterSettings,
    rate_limiter: DefaultDirectRateLimiter,
}

impl ChatCompletionsArbiter {
    /// # Errors
    /// `Configuration` if the rate is zero or the HTTP client cannot be built
    pub fn new(settings: ArbiterSettings) -> Result<Self, MatchError> {
        let rate = NonZeroU32::new(settings.requests_per_second).ok_or_else(|| {
            MatchError::Configuration("arbiter requests_per_second must be positive".to_string())
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| MatchError::Configuration(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(Quota::per_second(rate)),
            settings,
        })
    }

    pub fn settings(&self) -> &ArbiterSettings {
        &self.settings
    }
}

#[async_trait::async_trait]
impl SemanticArbiter for ChatCompletionsArbiter {
    fn name(&self) -> &'static str {
        "chat-completions"
    }

    async fn arbitrate(&self, request: &ArbitrationRequest<'_>) -> Result<ArbiterOpinion, MatchError> {
        self.rate_limiter.until_ready().await;

        let prompt = build_prompt(request);
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: self.settings.max_tokens,
            temperature: 0.0,
        };

        tracing::debug!(
            code = %request.local.code,
            url = %request.remote.url,
            model = %self.settings.model,
            "Querying semantic arbiter"
        );

        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MatchError::ArbiterFailure(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(MatchError::ArbiterFailure("invalid API key".to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MatchError::ArbiterFailure(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| MatchError::ArbiterFailure(format!("malformed response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let opinion = parse_opinion(&content);
        tracing::debug!(
            code = %request.local.code,
            judgement = ?opinion.judgement,
            confidence = opinion.confidence,
            "Semantic arbiter replied"
        );
        Ok(opinion)
    }
}

fn or_unknown(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "unknown",
    }
}

/// Render the user prompt for one pair
pub fn build_prompt(request: &ArbitrationRequest<'_>) -> String {
    let local = request.local;
    let remote = request.remote;
    let evidence = request.evidence;

    let mut prompt = String::from(
        "Compare the following hotel records and decide whether they refer to the same hotel.\n",
    );
    let _ = writeln!(prompt, "Local Hotel: {}", local.name);
    let _ = writeln!(prompt, "Local Address: {}", or_unknown(local.address.as_deref()));
    let _ = writeln!(prompt, "Local Postal Code: {}", or_unknown(local.postal_code.as_deref()));
    let _ = writeln!(prompt, "Listing Hotel: {}", remote.name);
    let _ = writeln!(prompt, "Listing Address: {}", or_unknown(remote.address.as_deref()));
    let _ = writeln!(prompt, "Listing Postal Code: {}", or_unknown(remote.postal_code.as_deref()));

    match evidence.distance_m() {
        Some(d) => {
            let _ = writeln!(prompt, "Distance Between Them: {:.0} m", d);
        }
        None => prompt.push_str("Distance Between Them: unknown\n"),
    }

    for dimension in Dimension::ALL {
        if let Some(similarity) = evidence.similarity(dimension) {
            let _ = writeln!(prompt, "Rule {} similarity: {:.0}/100", dimension, similarity * 100.0);
        }
    }
    let _ = writeln!(prompt, "Rule confidence: {:.0}/100", request.confidence * 100.0);

    prompt.push_str(
        "Format your response as:\n\
         Verdict: MATCH, NO_MATCH or UNSURE\n\
         Confidence: <0-100>\n\
         Explanation: <one sentence>\n",
    );
    prompt
}

fn parse_percent(value: &str) -> Option<f64> {
    let number = value.trim().trim_end_matches('%').trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 100.0))
}

/// Split `Key: value` lines case-insensitively, ignoring markdown bullets
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let line = line
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c.is_whitespace());
    let (name, value) = line.split_once(':')?;
    if name.trim().trim_matches('*').eq_ignore_ascii_case(key) {
        Some(value.trim().trim_matches('*').trim())
    } else {
        None
    }
}

/// Parse an arbiter reply into an opinion
pub fn parse_opinion(reply: &str) -> ArbiterOpinion {
    let mut verdict = None;
    let mut confidence = None;
    let mut similarity = None;
    let mut explanation = None;

    for line in reply.lines() {
        if let Some(value) = field(line, "verdict") {
            let token = value
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase()
                .replace('-', "_");
            verdict = match token.trim_matches(|c: char| !c.is_ascii_alphabetic() && c != '_') {
                "MATCH" | "SAME" => Some(Judgement::Match),
                "NO_MATCH" | "NOMATCH" | "NO" | "DIFFERENT" => Some(Judgement::NoMatch),
                "UNSURE" | "INCONCLUSIVE" | "UNKNOWN" => Some(Judgement::Inconclusive),
                _ => None,
            };
        } else if let Some(value) = field(line, "confidence") {
            confidence = parse_percent(value);
        } else if let Some(value) = field(line, "similarity") {
            similarity = parse_percent(value);
        } else if let Some(value) = field(line, "explanation") {
            if !value.is_empty() {
                explanation = Some(value.to_string());
            }
        }
    }

    let opinion = match (verdict, similarity) {
        (Some(Judgement::Inconclusive), _) => ArbiterOpinion::new(Judgement::Inconclusive, 0.0),
        (Some(judgement), _) => ArbiterOpinion::new(judgement, confidence.unwrap_or(0.0) / 100.0),
        (None, Some(score)) if score >= 50.0 => ArbiterOpinion::new(Judgement::Match, score / 100.0),
        (None, Some(score)) => ArbiterOpinion::new(Judgement::NoMatch, (100.0 - score) / 100.0),
        (None, None) => ArbiterOpinion::new(Judgement::Inconclusive, 0.0),
    };

    match explanation {
        Some(text) => opinion.with_rationale(text),
        None => opinion,
    }
}
