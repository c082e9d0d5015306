use std::time::Duration;

use async_trait::async_trait;
use scoring::{ClassifierError, SentimentLabel, SentimentResult, TextSentimentClassifier};
use serde::Deserialize;

pub const DEFAULT_MAX_CHARS: usize = 2000;

#[derive(Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl InferenceResponse {
    fn into_scores(self) -> Vec<LabelScore> {
        match self {
            InferenceResponse::Nested(v) => v.into_iter().flatten().collect(),
            InferenceResponse::Flat(v) => v,
        }
    }
}

/// Text-classification endpoint speaking the Hugging Face inference shape:
/// `POST {"inputs": text}` answered by `[[{label, score}, ...]]`.
pub struct HttpSentimentClassifier {
    url: String,
    token: Option<String>,
    max_chars: usize,
    client: reqwest::Client,
}

impl HttpSentimentClassifier {
    pub fn new(url: String, token: Option<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Http(e.to_string()))?;
        Ok(Self { url, token, max_chars: DEFAULT_MAX_CHARS, client })
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    async fn infer_chunk(&self, chunk: &str) -> Result<[f64; 3], ClassifierError> {
        let body = serde_json::json!({ "inputs": chunk });
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(t) = &self.token {
            req = req.bearer_auth(t);
        }

        let resp = req.send().await.map_err(|e| ClassifierError::Http(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClassifierError::Http(format!("inference endpoint returned HTTP {status}")));
        }
        let parsed: InferenceResponse = resp.json().await.map_err(|e| ClassifierError::Decode(e.to_string()))?;

        let mut scores = [0.0; 3];
        let mut recognized = false;
        for ls in parsed.into_scores() {
            if let Some(label) = SentimentLabel::parse(&ls.label) {
                scores[slot(label)] = ls.score;
                recognized = true;
            }
        }
        if !recognized {
            return Err(ClassifierError::Decode("no recognizable sentiment labels".into()));
        }
        Ok(scores)
    }
}

#[async_trait]
impl TextSentimentClassifier for HttpSentimentClassifier {
    async fn infer(&self, text: &str) -> Result<SentimentResult, ClassifierError> {
        let chunks = chunk_text(text, self.max_chars);
        if chunks.is_empty() {
            return Ok(SentimentResult::neutral());
        }
        let mut totals = [0.0; 3];
        for chunk in &chunks {
            let s = self.infer_chunk(chunk).await?;
            for (t, v) in totals.iter_mut().zip(s) {
                *t += v;
            }
        }
        let n = chunks.len() as f64;
        Ok(best_label(totals.map(|t| t / n)))
    }
}

fn slot(label: SentimentLabel) -> usize {
    match label {
        SentimentLabel::Positive => 0,
        SentimentLabel::Negative => 1,
        SentimentLabel::Neutral => 2,
    }
}

/// Highest averaged score wins; ties resolve in `SentimentLabel::ALL` order.
fn best_label(avg: [f64; 3]) -> SentimentResult {
    let mut best = SentimentLabel::ALL[0];
    for label in SentimentLabel::ALL.iter().skip(1) {
        if avg[slot(*label)] > avg[slot(best)] {
            best = *label;
        }
    }
    SentimentResult::new(best, avg[slot(best)])
}

/// Splits on whitespace into chunks of at most `max_chars` characters. A
/// single word longer than the limit is hard-split.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !cur.is_empty() {
                chunks.push(std::mem::take(&mut cur));
                cur_len = 0;
            }
            let rest = word.split_off(max_chars);
            chunks.push(word.into_iter().collect());
            word = rest;
        }
        let wlen = word.len();
        if wlen == 0 {
            continue;
        }
        let needed = if cur.is_empty() { wlen } else { cur_len + 1 + wlen };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut cur));
            cur_len = 0;
        }
        if !cur.is_empty() {
            cur.push(' ');
            cur_len += 1;
        }
        cur.extend(word);
        cur_len += wlen;
    }
    if !cur.is_empty() {
        chunks.push(cur);
    }
    chunks
}
