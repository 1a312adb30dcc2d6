use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{AdvisorProposal, AdvisorRequest, PortfolioAdvisor, describe_prompt, portfolio_prompt};
use crate::core::{Etf, RiskTier};
use crate::error::AdvisorError;

static API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub struct GeminiAdvisor {
    client: Client,
    model: String,
}

impl GeminiAdvisor {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            model: model.into(),
        }
    }

    async fn generate<T: DeserializeOwned>(
        &self,
        api_key: &str,
        prompt: String,
        schema: Value,
    ) -> Result<T, AdvisorError> {
        if api_key.trim().is_empty() {
            return Err(AdvisorError::MissingApiKey);
        }

        let url = format!("{API_BASE}/{}:generateContent", self.model);
        debug!("POST {url}");
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key.trim())
            .json(&request_body(&prompt, schema))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(AdvisorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response_text(&body)?;
        serde_json::from_str(text.trim())
            .map_err(|err| AdvisorError::MalformedResponse(err.to_string()))
    }
}

#[async_trait]
impl PortfolioAdvisor for GeminiAdvisor {
    async fn propose_portfolio(
        &self,
        request: &AdvisorRequest,
    ) -> Result<AdvisorProposal, AdvisorError> {
        self.generate(&request.api_key, portfolio_prompt(request), portfolio_schema())
            .await
    }

    async fn describe_etf(
        &self,
        api_key: &str,
        ticker: &str,
        categories: &[String],
    ) -> Result<Etf, AdvisorError> {
        let draft: EtfDraft = self
            .generate(api_key, describe_prompt(ticker, categories), etf_schema())
            .await?;
        Ok(draft.into_etf(ticker))
    }
}

#[derive(Debug, Deserialize)]
struct EtfDraft {
    #[serde(default)]
    name: String,
    #[serde(default)]
    desc: String,
    #[serde(default)]
    pros: String,
    #[serde(default)]
    cons: String,
    #[serde(rename = "yield")]
    dividend_yield: f64,
    growth: f64,
    #[serde(default)]
    risk: RiskTier,
    #[serde(default)]
    category: String,
}

impl EtfDraft {
    fn into_etf(self, ticker: &str) -> Etf {
        Etf {
            ticker: ticker.trim().to_uppercase(),
            name: self.name,
            desc: self.desc,
            pros: self.pros,
            cons: self.cons,
            dividend_yield: self.dividend_yield,
            growth: self.growth,
            risk: self.risk,
            category: self.category,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

fn request_body(prompt: &str, schema: Value) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": schema
        }
    })
}

fn response_text(body: &str) -> Result<String, AdvisorError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|err| AdvisorError::MalformedResponse(err.to_string()))?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| AdvisorError::MalformedResponse("response has no text candidate".into()))
}

fn portfolio_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING", "description": "Short descriptive portfolio name." },
            "desc": { "type": "STRING", "description": "One-sentence strategy description." },
            "weights": {
                "type": "ARRAY",
                "description": "Ticker and weight pairs; weights sum to 1.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "ticker": { "type": "STRING" },
                        "weight": { "type": "NUMBER" }
                    },
                    "required": ["ticker", "weight"]
                }
            }
        },
        "required": ["name", "desc", "weights"]
    })
}

fn etf_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING" },
            "desc": { "type": "STRING" },
            "pros": { "type": "STRING" },
            "cons": { "type": "STRING" },
            "yield": { "type": "NUMBER" },
            "growth": { "type": "NUMBER" },
            "risk": { "type": "STRING", "enum": ["low", "neutral", "high"] },
            "category": { "type": "STRING" }
        },
        "required": ["name", "desc", "pros", "cons", "yield", "growth", "risk", "category"]
    })
}
