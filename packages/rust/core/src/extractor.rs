//! Structured FAQ extraction from normalized page text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use campusguide_shared::{GuideError, KnowledgeEntry, Result};

use crate::llm::{CompletionRequest, LanguageModel};
use crate::prompts::{self, PromptTemplates};

/// Appended when page text is cut to the character budget.
pub const TRUNCATION_MARKER: &str = "\n...(이하 생략)";

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n?(.*?)\n?\s*```\s*$").expect("valid fence regex")
});

/// What the extractor knows about the page it is reading.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionInput<'a> {
    pub scope_id: &'a str,
    pub scope_label: &'a str,
    pub url: &'a str,
    pub text: &'a str,
}

/// Turns page text into keyword/answer entries with one model call.
pub struct KnowledgeExtractor<'a> {
    model: &'a dyn LanguageModel,
    templates: &'a PromptTemplates,
    temperature: f32,
    max_chars: usize,
}

impl<'a> KnowledgeExtractor<'a> {
    pub fn new(
        model: &'a dyn LanguageModel,
        templates: &'a PromptTemplates,
        temperature: f32,
        max_chars: usize,
    ) -> Self {
        Self {
            model,
            templates,
            temperature,
            max_chars,
        }
    }

    /// Extract entries from `input.text`.
    ///
    /// An empty result is a valid outcome. Output that is not a JSON object,
    /// or whose `faqs` is not an array, is a [`GuideError::Parse`].
    #[instrument(skip_all, fields(scope_id = input.scope_id, url = input.url))]
    pub async fn extract(&self, input: ExtractionInput<'_>) -> Result<Vec<KnowledgeEntry>> {
        let original_chars = input.text.chars().count();
        if original_chars > self.max_chars {
            debug!(max_chars = self.max_chars, original_chars, "page text truncated");
        }
        let page_text = truncate_chars(input.text, self.max_chars);

        let user = prompts::render(
            &self.templates.extract_user,
            &[
                ("scope_id", input.scope_id),
                ("scope_label", input.scope_label),
                ("url", input.url),
                ("page_text", &page_text),
            ],
        );

        let reply = self
            .model
            .complete(&CompletionRequest {
                system: self.templates.extract_system.clone(),
                user,
                temperature: self.temperature,
                json_object: true,
            })
            .await?;

        let entries = parse_faqs(&reply)?;
        info!(extracted = entries.len(), "knowledge extracted");
        Ok(entries)
    }
}

/// Parse a `{"faqs": [...]}` reply into validated entries.
pub fn parse_faqs(reply: &str) -> Result<Vec<KnowledgeEntry>> {
    let payload = strip_code_fence(reply);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| GuideError::parse(format!("model output is not valid JSON: {e}")))?;

    let Value::Object(mut object) = value else {
        return Err(GuideError::parse("model output is not a JSON object"));
    };

    let items = match object.remove("faqs") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(GuideError::parse("`faqs` is not an array")),
    };

    let total = items.len();
    let entries: Vec<KnowledgeEntry> = items.iter().filter_map(entry_from_value).collect();
    if entries.len() < total {
        warn!(
            dropped = total - entries.len(),
            kept = entries.len(),
            "dropped malformed faq entries"
        );
    }
    Ok(entries)
}

fn entry_from_value(item: &Value) -> Option<KnowledgeEntry> {
    let object = item.as_object()?;
    let keyword = object
        .get("keyword")
        .or_else(|| object.get("question"))?
        .as_str()?;
    let answer = object.get("answer")?.as_str()?;
    KnowledgeEntry::new(keyword, answer)
}

fn strip_code_fence(reply: &str) -> &str {
    match CODE_FENCE.captures(reply).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => reply.trim(),
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;

    fn input(text: &str) -> ExtractionInput<'_> {
        ExtractionInput {
            scope_id: "1",
            scope_label: "1호관",
            url: "https://campus.example/b1",
            text,
        }
    }

    #[test]
    fn parses_keyword_and_question_forms() {
        let entries = parse_faqs(
            r#"{"faqs": [
                {"keyword": "사무실", "answer": "2층입니다"},
                {"question": " 열람실 ", "answer": " 3층에 있습니다 "}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            entries,
            vec![
                KnowledgeEntry::new("사무실", "2층입니다").unwrap(),
                KnowledgeEntry::new("열람실", "3층에 있습니다").unwrap(),
            ]
        );
    }

    #[test]
    fn tolerates_code_fences() {
        let reply = "```json\n{\"faqs\": [{\"keyword\": \"매점\", \"answer\": \"1층\"}]}\n```";
        assert_eq!(parse_faqs(reply).unwrap().len(), 1);

        let bare = "```\n{\"faqs\": []}\n```";
        assert!(parse_faqs(bare).unwrap().is_empty());
    }

    #[test]
    fn drops_malformed_entries_silently() {
        let entries = parse_faqs(
            r#"{"faqs": [
                "not an object",
                {"keyword": "", "answer": "빈 키워드"},
                {"keyword": "주차장"},
                {"keyword": 3, "answer": "숫자 키워드"},
                {"keyword": "주차장", "answer": "지하 1층"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(entries, vec![KnowledgeEntry::new("주차장", "지하 1층").unwrap()]);
    }

    #[test]
    fn missing_faqs_is_empty() {
        assert!(parse_faqs(r#"{"items": []}"#).unwrap().is_empty());
        assert!(parse_faqs(r#"{"faqs": null}"#).unwrap().is_empty());
    }

    #[test]
    fn non_object_output_is_parse_error() {
        for bad in ["사무실은 2층입니다", "[1, 2]", r#""faqs""#, ""] {
            let err = parse_faqs(bad).unwrap_err();
            assert!(matches!(err, GuideError::Parse { .. }), "{bad:?} -> {err:?}");
        }
    }

    #[test]
    fn non_array_faqs_is_parse_error() {
        let err = parse_faqs(r#"{"faqs": {"keyword": "a", "answer": "b"}}"#).unwrap_err();
        assert!(matches!(err, GuideError::Parse { .. }));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("가나다", 5), "가나다");
        assert_eq!(truncate_chars("가나다라", 2), format!("가나{TRUNCATION_MARKER}"));
        assert_eq!(truncate_chars("", 0), "");
    }

    #[tokio::test]
    async fn single_json_mode_call_with_rendered_prompt() {
        let model = ScriptedModel::with_replies([
            r#"{"faqs": [{"keyword": "사무실", "answer": "사무실 위치는 2층입니다"}]}"#,
        ]);
        let templates = PromptTemplates::default();
        let extractor = KnowledgeExtractor::new(&model, &templates, 0.2, 12_000);

        let entries = extractor
            .extract(input("사무실 위치는 2층입니다"))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_object);
        assert_eq!(requests[0].temperature, 0.2);
        assert!(requests[0].user.contains("사무실 위치는 2층입니다"));
        assert!(requests[0].user.contains("https://campus.example/b1"));
        assert!(!requests[0].user.contains("{page_text}"));
    }

    #[tokio::test]
    async fn long_text_is_cut_before_sending() {
        let model = ScriptedModel::with_replies([r#"{"faqs": []}"#]);
        let templates = PromptTemplates::default();
        let extractor = KnowledgeExtractor::new(&model, &templates, 0.2, 10);

        let text = "가".repeat(50);
        let entries = extractor.extract(input(&text)).await.unwrap();
        assert!(entries.is_empty());

        let sent = &model.requests()[0].user;
        assert!(sent.contains(&format!("{}{TRUNCATION_MARKER}", "가".repeat(10))));
        assert!(!sent.contains(&"가".repeat(11)));
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let model = ScriptedModel::new();
        model.push_error(GuideError::Llm("down".into()));
        let templates = PromptTemplates::default();
        let extractor = KnowledgeExtractor::new(&model, &templates, 0.2, 100);

        let err = extractor.extract(input("text")).await.unwrap_err();
        assert!(matches!(err, GuideError::Llm(_)));
    }
}
