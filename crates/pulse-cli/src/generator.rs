//! An artifact generator backed by a generative-language HTTP endpoint.

use std::time::Duration;

use anyhow::Context as _;
use chrono::Datelike;
use pulse_core::{
  Tier,
  collab::{ArtifactGenerator, CollabError, GenerationRequest},
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::settings::GeneratorSettings;

/// Rows of each raw log included in a daily prompt.
const SAMPLE_ROWS: usize = 40;

#[derive(Clone)]
pub struct HttpGenerator {
  client:   Client,
  settings: GeneratorSettings,
}

impl HttpGenerator {
  pub fn new(settings: GeneratorSettings) -> anyhow::Result<Self> {
    anyhow::ensure!(
      !settings.api_key.is_empty(),
      "generator.api_key is not set (PULSE_GENERATOR__API_KEY)"
    );
    let client = Client::builder()
      .timeout(Duration::from_secs(settings.timeout_secs))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, settings })
  }

  fn url(&self) -> String {
    format!(
      "{}/{}:generateContent",
      self.settings.endpoint.trim_end_matches('/'),
      self.settings.model
    )
  }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateBody<'a> {
  contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
  parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
  text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
  content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
  text: Option<String>,
}

/// Text of the first part of the first candidate.
fn first_text(response: GenerateResponse) -> Option<String> {
  let text = response
    .candidates
    .into_iter()
    .next()?
    .content?
    .parts
    .into_iter()
    .next()?
    .text?;
  let text = text.trim();
  (!text.is_empty()).then(|| text.to_owned())
}

// ─── Prompts ─────────────────────────────────────────────────────────────────

pub fn prompt(request: &GenerationRequest) -> String {
  let period = request.period;
  let (first, last) = (period.start(), period.end());

  match request.tier() {
    Tier::Daily => {
      let logs = request
        .inputs
        .iter()
        .map(|input| {
          let sample: Vec<&str> = input.body.lines().take(SAMPLE_ROWS).collect();
          format!("### {}\n{}", input.label, sample.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n\n");
      format!(
        "You are a trading coach. Review the trade logs for {first}.\n\
         Write a markdown brief under 220 words with these sections:\n\
         ## Pulse Check (2 bullets on win/loss and risk-reward)\n\
         ## Mistakes to Fix (2 bullets)\n\
         ## Focus & Mindset (2 bullets)\n\
         ## Next Session (exactly three numbered action items)\n\
         Account for fees and commissions when judging PnL.\n\n\
         Trade logs:\n{logs}"
      )
    }
    Tier::Weekly => format!(
      "Summarize these daily trading reports for {first} to {last}.\n\
       Stay under 180 words with markdown sections:\n\
       ## Weekly Pulse (2 bullets)\n\
       ## Recurring Mistakes (2 bullets)\n\
       ## Bright Spots (2 bullets)\n\
       ## Focus for Next Week (3 bullets)\n\n\
       Daily reports:\n{}",
      joined(request)
    ),
    Tier::Monthly => format!(
      "Write a high-level trading review for {} {} ({first} to {last}).\n\
       Stay under 220 words with markdown sections:\n\
       ## Macro Pulse (2 bullets)\n\
       ## Strategy Insights (2 bullets)\n\
       ## Risk & Psychology (2 bullets)\n\
       ## Goals for Next Month (3 bullets)\n\n\
       Weekly reports:\n{}",
      first.format("%B"),
      first.year(),
      joined(request)
    ),
  }
}

fn joined(request: &GenerationRequest) -> String {
  request
    .inputs
    .iter()
    .map(|input| format!("### {}\n{}", input.label, input.body))
    .collect::<Vec<_>>()
    .join("\n\n")
}

// ─── Trait impl ──────────────────────────────────────────────────────────────

impl ArtifactGenerator for HttpGenerator {
  async fn generate(
    &self,
    request: GenerationRequest,
  ) -> Result<String, CollabError> {
    let prompt = prompt(&request);
    tracing::info!(
      chars = prompt.len(),
      model = %self.settings.model,
      "calling generator"
    );

    let body = GenerateBody {
      contents: [Content {
        parts: [Part { text: &prompt }],
      }],
    };
    let resp = self
      .client
      .post(self.url())
      .query(&[("key", self.settings.api_key.as_str())])
      .json(&body)
      .send()
      .await
      .map_err(|e| CollabError::Unavailable(e.without_url().to_string()))?;

    let status = resp.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
      return Err(CollabError::Unavailable(format!("generator returned {status}")));
    }
    if !status.is_success() {
      return Err(CollabError::Rejected(format!("generator returned {status}")));
    }

    let response: GenerateResponse = resp
      .json()
      .await
      .map_err(|e| CollabError::Malformed(e.without_url().to_string()))?;
    first_text(response)
      .ok_or_else(|| CollabError::Malformed("response carried no text".to_owned()))
  }
}
