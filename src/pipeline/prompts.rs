//! Stage prompts for the generation flows.
//!
//! Each of the three flow stages pairs a fixed system prompt with a built
//! user prompt. Wording is part of the product, not of the engine; the
//! orchestrator only threads the outputs through.

use crate::retrieval::ScoredPoint;

/// System prompt for the draft stage.
pub const DRAFT_SYSTEM_PROMPT: &str = "你是中文资深文案，依据模板句式快速产出段落。";

/// System prompt for the tone stage.
pub const TONE_SYSTEM_PROMPT: &str = "你是文案风格调校器，严格套入给定语气要素。";

/// System prompt for the evidence stage.
pub const EVIDENCE_SYSTEM_PROMPT: &str =
    "你是事实/论证增强器，请在不改变大意的情况下把证据融入文案，增强可信度。";

/// Tone guideline used when neither an explicit guideline nor a matching
/// voice is available.
pub const FALLBACK_TONE_GUIDELINE: &str = "语气清晰、真诚，面向普通读者。";

/// Builds the user prompt for the draft stage.
pub fn build_draft_prompt(title: &str, template_text: &str) -> String {
    format!(
        "题目：《{title}》\n\
         请根据给定模板生成《初级文案》，要求：\n\
         模板内容：{template_text}\n\
         - 中文输出，篇幅控制在 120-180 字之间；\n\
         - 保持结构与模板一致。"
    )
}

/// Builds the user prompt for the tone stage.
pub fn build_tone_prompt(title: &str, tone_guideline: &str, draft: &str) -> String {
    format!(
        "题目：《{title}》\n\
         以下是《初级文案》，请严格依据语气指引生成《中级文案》。\n\
         语气指引：{tone_guideline}\n\
         《初级文案》：{draft}"
    )
}

/// Builds the user prompt for the evidence stage.
pub fn build_evidence_prompt(title: &str, evidence_text: &str, toned: &str) -> String {
    format!(
        "题目：《{title}》\n\
         以下是《中级文案》与证据材料，请整合证据输出《最终文案》，保证叙事连贯。\n\
         证据：{evidence_text}\n\
         《中级文案》：{toned}"
    )
}

/// Resolves the tone guideline for one flow.
///
/// Precedence: explicit `guideline` text on the tone record, else a
/// synthesized guideline referencing the requested voice when the record's
/// `name` matches it, else the generic fallback.
pub fn resolve_tone_guideline(tone: &ScoredPoint, voice: Option<&str>) -> String {
    let explicit = tone.str_field("guideline");
    if !explicit.is_empty() {
        return explicit.to_string();
    }

    if let Some(voice) = voice {
        if !voice.is_empty() && tone.str_field("name") == voice {
            return format!("以「{voice}」的口吻撰写，保持该语气贯穿全文。");
        }
    }

    FALLBACK_TONE_GUIDELINE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(name: &str, guideline: &str) -> ScoredPoint {
        let mut payload = serde_json::Map::new();
        if !name.is_empty() {
            payload.insert("name".to_string(), serde_json::Value::from(name));
        }
        if !guideline.is_empty() {
            payload.insert("guideline".to_string(), serde_json::Value::from(guideline));
        }
        ScoredPoint {
            payload,
            score: 1.0,
        }
    }

    #[test]
    fn test_build_draft_prompt_contains_title_and_template() {
        let prompt = build_draft_prompt("节能小妙招", "先抛问题，再给三个要点");
        assert!(prompt.contains("《节能小妙招》"));
        assert!(prompt.contains("先抛问题，再给三个要点"));
        assert!(prompt.contains("120-180"));
    }

    #[test]
    fn test_build_tone_prompt_threads_draft() {
        let prompt = build_tone_prompt("标题", "克制、数据驱动", "初稿文本");
        assert!(prompt.contains("克制、数据驱动"));
        assert!(prompt.contains("初稿文本"));
    }

    #[test]
    fn test_build_evidence_prompt_threads_toned_text() {
        let prompt = build_evidence_prompt("标题", "一组数据", "中级文本");
        assert!(prompt.contains("一组数据"));
        assert!(prompt.contains("中级文本"));
    }

    #[test]
    fn test_resolve_tone_guideline_prefers_explicit() {
        let guideline = resolve_tone_guideline(&tone("理性专家", "克制、数据驱动"), Some("理性专家"));
        assert_eq!(guideline, "克制、数据驱动");
    }

    #[test]
    fn test_resolve_tone_guideline_synthesizes_for_matching_voice() {
        let guideline = resolve_tone_guideline(&tone("理性专家", ""), Some("理性专家"));
        assert!(guideline.contains("理性专家"));
    }

    #[test]
    fn test_resolve_tone_guideline_falls_back() {
        // Non-matching voice
        let guideline = resolve_tone_guideline(&tone("理性专家", ""), Some("感性讲述"));
        assert_eq!(guideline, FALLBACK_TONE_GUIDELINE);

        // No voice at all
        let guideline = resolve_tone_guideline(&tone("理性专家", ""), None);
        assert_eq!(guideline, FALLBACK_TONE_GUIDELINE);
    }
}
