//! Prompt templates for extraction and answering.
//!
//! Defaults are compiled in from `prompts/*.txt`. A directory configured as
//! `[prompts] dir` may override any of the four files by name.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use campusguide_shared::{GuideError, Result};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"));

const EXTRACT_SYSTEM: &str = include_str!("../prompts/extract_system.txt");
const EXTRACT_USER: &str = include_str!("../prompts/extract_user.txt");
const ANSWER_SYSTEM: &str = include_str!("../prompts/answer_system.txt");
const ANSWER_USER: &str = include_str!("../prompts/answer_user.txt");

/// The four templates used by the extractor and composer.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub extract_system: String,
    /// Placeholders: `{scope_id}` `{scope_label}` `{url}` `{page_text}`.
    pub extract_user: String,
    pub answer_system: String,
    /// Placeholders: `{knowledge}` `{scope_label}` `{context}` `{question}`.
    pub answer_user: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            extract_system: EXTRACT_SYSTEM.to_string(),
            extract_user: EXTRACT_USER.to_string(),
            answer_system: ANSWER_SYSTEM.to_string(),
            answer_user: ANSWER_USER.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Built-in templates, with any files present in `dir` taking precedence.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut templates = Self::default();
        let Some(dir) = dir else {
            return Ok(templates);
        };
        if !dir.is_dir() {
            return Err(GuideError::config(format!(
                "prompts.dir '{}' is not a directory",
                dir.display()
            )));
        }

        for (name, slot) in [
            ("extract_system.txt", &mut templates.extract_system),
            ("extract_user.txt", &mut templates.extract_user),
            ("answer_system.txt", &mut templates.answer_system),
            ("answer_user.txt", &mut templates.answer_user),
        ] {
            let path = dir.join(name);
            if path.is_file() {
                *slot = std::fs::read_to_string(&path).map_err(|e| GuideError::io(&path, e))?;
                debug!(?path, "prompt template overridden");
            }
        }
        Ok(templates)
    }
}

/// Substitute `{name}` placeholders in one pass.
///
/// Values are inserted literally, so braces inside a value are never
/// expanded. Unknown placeholders are left as written.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match vars.iter().find(|(key, _)| *key == name) {
                Some((_, value)) => (*value).to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_replaces_known_placeholders() {
        let out = render(
            "{scope_label}: {question}",
            &[("question", "매점 어디?"), ("scope_label", "1호관")],
        );
        assert_eq!(out, "1호관: 매점 어디?");
    }

    #[test]
    fn render_is_single_pass() {
        let out = render("{question} / {context}", &[
            ("question", "{context}"),
            ("context", "x"),
        ]);
        assert_eq!(out, "{context} / x");
    }

    #[test]
    fn render_leaves_unknown_and_json_braces() {
        let out = render(r#"{"faqs": []} {other}"#, &[("question", "q")]);
        assert_eq!(out, r#"{"faqs": []} {other}"#);
    }

    #[test]
    fn defaults_carry_their_placeholders() {
        let t = PromptTemplates::default();
        for p in ["{scope_id}", "{scope_label}", "{url}", "{page_text}"] {
            assert!(t.extract_user.contains(p), "extract_user missing {p}");
        }
        for p in ["{knowledge}", "{scope_label}", "{context}", "{question}"] {
            assert!(t.answer_user.contains(p), "answer_user missing {p}");
        }
    }

    #[test]
    fn directory_overrides_single_file() {
        let dir = std::env::temp_dir().join(format!("cg_prompts_{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("answer_system.txt"), "custom system").unwrap();

        let t = PromptTemplates::load(Some(&dir)).expect("load");
        assert_eq!(t.answer_system, "custom system");
        assert_eq!(t.extract_user, EXTRACT_USER);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_directory_is_config_error() {
        let dir = std::env::temp_dir().join(format!("cg_missing_{}", uuid::Uuid::now_v7()));
        let err = PromptTemplates::load(Some(&dir)).unwrap_err();
        assert!(matches!(err, GuideError::Config { .. }));
    }
}
