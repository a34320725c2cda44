use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, instrument};

use super::{AnalysisError, FoodAnalysis, FoodAnalyzer};
use crate::config::VisionConfig;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 60;
const MAX_TOKENS: u32 = 500;

const SYSTEM_PROMPT: &str = "You are a nutritionist specialized in visual food analysis. \
Analyze the image and return a strict JSON object with these keys: \
name (string, dish name), calories (integer, total energy in kcal), \
protein (number, grams), fats (number, grams), carbs (number, grams), \
weight_grams (number, estimated total weight), \
is_food (boolean, true only if the image contains edible food). \
If is_food is false set all numbers to 0 and name to \"Not food\".";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    max_tokens: u32,
    response_format: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Vision analysis over an OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiVision {
    client: Client,
    config: VisionConfig,
}

impl OpenAiVision {
    pub fn new(config: VisionConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, config })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn build_request(&self, image: &[u8], content_type: &str) -> ChatRequest {
        let data_url = format!("data:{};base64,{}", content_type, STANDARD.encode(image));
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                json!({ "role": "system", "content": SYSTEM_PROMPT }),
                json!({
                    "role": "user",
                    "content": [
                        { "type": "text", "text": "Analyze this meal for my calorie tracker." },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }),
            ],
            max_tokens: MAX_TOKENS,
            response_format: json!({ "type": "json_object" }),
        }
    }
}

/// Pulls the analysis JSON out of a chat completion body.
fn parse_completion(body: &str) -> Result<FoodAnalysis, AnalysisError> {
    let response: ChatResponse = serde_json::from_str(body)?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(AnalysisError::Empty)?;
    Ok(serde_json::from_str(&content)?)
}

#[async_trait]
impl FoodAnalyzer for OpenAiVision {
    #[instrument(skip(self, image), fields(bytes = image.len(), model = %self.config.model))]
    async fn analyze(
        &self,
        image: &[u8],
        content_type: &str,
    ) -> Result<FoodAnalysis, AnalysisError> {
        let request = self.build_request(image, content_type);
        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(%status, "vision service error");
            return Err(AnalysisError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let analysis = parse_completion(&body)?;
        debug!(name = %analysis.name, calories = analysis.calories, is_food = analysis.is_food, "vision analysis");
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vision() -> OpenAiVision {
        OpenAiVision::new(VisionConfig {
            api_key: "sk-test".into(),
            base_url: "https://vision.local/v1/".into(),
            model: "test-model".into(),
        })
        .unwrap()
    }

    #[test]
    fn request_carries_inline_image() {
        let v = vision();
        assert_eq!(v.api_url("chat/completions"), "https://vision.local/v1/chat/completions");

        let req = serde_json::to_value(v.build_request(b"abc", "image/png")).unwrap();
        assert_eq!(req["model"], "test-model");
        assert_eq!(req["response_format"]["type"], "json_object");
        assert_eq!(
            req["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,YWJj"
        );
    }

    #[test]
    fn parses_completion_content() {
        let body = r#"{"choices":[{"message":{"content":"{\"name\":\"Salad\",\"calories\":180,\"protein\":4.5,\"fats\":12,\"carbs\":9,\"weight_grams\":250,\"is_food\":true}"}}]}"#;
        let a = parse_completion(body).unwrap();
        assert_eq!(a.name, "Salad");
        assert_eq!(a.calories, 180);
        assert_eq!(a.weight_grams, 250.0);
    }

    #[test]
    fn empty_completion_is_an_error() {
        let body = r#"{"choices":[{"message":{"content":""}}]}"#;
        assert!(matches!(parse_completion(body), Err(AnalysisError::Empty)));
        let body = r#"{"choices":[]}"#;
        assert!(matches!(parse_completion(body), Err(AnalysisError::Empty)));
    }

    #[test]
    fn non_json_content_is_malformed() {
        let body = r#"{"choices":[{"message":{"content":"a plate of pasta"}}]}"#;
        assert!(matches!(parse_completion(body), Err(AnalysisError::Malformed(_))));
    }
}
