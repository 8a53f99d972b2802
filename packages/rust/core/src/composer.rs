//! Answer synthesis from retrieved knowledge.

use tracing::{info, instrument};

use campusguide_shared::{Result, RetrievalMatch};

use crate::llm::{CompletionRequest, LanguageModel};
use crate::prompts::{self, PromptTemplates};

/// Knowledge block used when retrieval found nothing.
pub const NO_KNOWLEDGE: &str = "지식 없음";

/// Scope label used when the caller gave none.
pub const UNKNOWN_SCOPE_LABEL: &str = "알 수 없음";

/// Render matches as a numbered knowledge block.
pub fn knowledge_block(matches: &[RetrievalMatch]) -> String {
    if matches.is_empty() {
        return NO_KNOWLEDGE.to_string();
    }
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "[{}] 위치: {}\n키워드: {}\n설명: {}\n",
                i + 1,
                m.location_label,
                m.keyword,
                m.answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct AnswerComposer<'a> {
    model: &'a dyn LanguageModel,
    templates: &'a PromptTemplates,
    temperature: f32,
}

impl<'a> AnswerComposer<'a> {
    pub fn new(model: &'a dyn LanguageModel, templates: &'a PromptTemplates, temperature: f32) -> Self {
        Self {
            model,
            templates,
            temperature,
        }
    }

    /// One free-form model call; the reply is returned as-is.
    #[instrument(skip_all, fields(matches = matches.len()))]
    pub async fn compose(
        &self,
        question: &str,
        matches: &[RetrievalMatch],
        scope_label: Option<&str>,
        context: Option<&str>,
    ) -> Result<String> {
        let knowledge = knowledge_block(matches);
        let user = prompts::render(
            &self.templates.answer_user,
            &[
                ("knowledge", &knowledge),
                ("scope_label", scope_label.unwrap_or(UNKNOWN_SCOPE_LABEL)),
                ("context", context.unwrap_or("")),
                ("question", question),
            ],
        );

        let answer = self
            .model
            .complete(&CompletionRequest {
                system: self.templates.answer_system.clone(),
                user,
                temperature: self.temperature,
                json_object: false,
            })
            .await?;

        info!(answer_chars = answer.chars().count(), "answer composed");
        Ok(answer)
    }
}
