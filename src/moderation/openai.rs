use std::time::Duration;

use reqwest::Client;
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::config::ModerationConfig;
use crate::error::{Error, Result};

use super::LanguageService;

const CLASSIFY_PROMPT: &str = "\
You detect abusive comments on a Japanese polling site.

Answer NG if the text below does any of the following:
- insults someone, in any spelling (e.g. ばか, バカ, 馬鹿, アホ, ボケ)
- denies someone's worth (e.g. \"you are worthless\", \"useless\")
- mocks or sneers at someone
- is aggressive or crude (e.g. うざい, きもい, くそが, ざけんな)
- directs anger at another person
- threatens or describes violence (e.g. 殺す, 殴る)
- is otherwise likely to hurt someone (e.g. \"I can't stand that guy\")

Answer OK for criticism without hostility (e.g. \"I think there is room for improvement\").

Reply with exactly OK or NG and nothing else.

Text:
";

const SOFTEN_PROMPT: &str = "\
Rewrite the comment below so that it keeps its meaning but reads politely \
and cannot hurt anyone. Keep the language of the original. \
Reply with the rewritten comment only.

Comment:
";

/// [`LanguageService`] backed by the OpenAI moderation and chat completion APIs.
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    moderation_model: String,
    chat_model: String,
}

impl OpenAiClient {
    pub fn new(config: &ModerationConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            moderation_model: config.moderation_model.clone(),
            chat_model: config.chat_model.clone(),
        }
    }

    /// Send a single-message chat and return the reply text.
    async fn chat(&self, prompt: String) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response: ChatResponse = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| malformed("chat completion had no content"))
    }
}

#[rocket::async_trait]
impl LanguageService for OpenAiClient {
    async fn is_flagged(&self, text: &str) -> Result<bool> {
        let request = ModerationRequest {
            model: &self.moderation_model,
            input: text,
        };
        let response: ModerationResponse = self
            .http
            .post(format!("{}/moderations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response
            .results
            .first()
            .map(|result| result.flagged)
            .ok_or_else(|| malformed("moderation response had no results"))
    }

    async fn is_offensive(&self, text: &str) -> Result<bool> {
        let reply = self.chat(classification_prompt(text)).await?;
        trace!("Classifier replied {reply:?}");
        Ok(is_ng(&reply))
    }

    async fn soften(&self, text: &str) -> Result<String> {
        self.chat(softening_prompt(text)).await
    }
}

fn classification_prompt(text: &str) -> String {
    format!("{CLASSIFY_PROMPT}{text}")
}

fn softening_prompt(text: &str) -> String {
    format!("{SOFTEN_PROMPT}{text}")
}

/// Anything other than a clear `NG` counts as acceptable.
fn is_ng(reply: &str) -> bool {
    reply
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '「' | '」' | '.' | '。'))
        .eq_ignore_ascii_case("NG")
}

fn malformed(what: &str) -> Error {
    Error::Status(
        Status::BadGateway,
        format!("Language service returned an unexpected response: {what}"),
    )
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationOutcome>,
}

#[derive(Deserialize)]
struct ModerationOutcome {
    flagged: bool,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn classifier_replies() {
        assert!(is_ng("NG"));
        assert!(is_ng(" ng\n"));
        assert!(is_ng("「NG」"));
        assert!(!is_ng("OK"));
        assert!(!is_ng("Not sure"));
        assert!(!is_ng(""));
    }

    #[test]
    fn prompts_end_with_the_text() {
        assert!(classification_prompt("あいつ嫌い").ends_with("Text:\nあいつ嫌い"));
        assert!(softening_prompt("遅すぎる").ends_with("Comment:\n遅すぎる"));
    }

    #[test]
    fn parses_api_responses() {
        let moderation: ModerationResponse = serde_json::from_value(serde_json::json!({
            "id": "modr-1",
            "model": "omni-moderation-latest",
            "results": [{"flagged": true, "categories": {}}],
        }))
        .unwrap();
        assert!(moderation.results[0].flagged);

        let chat: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": " OK "}}],
        }))
        .unwrap();
        assert_eq!(chat.choices[0].message.content.as_deref(), Some(" OK "));
    }
}
