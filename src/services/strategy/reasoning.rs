//! Advanced-Reasoning Selector
//!
//! Decides whether a turn should run in the slower deep-reasoning mode.
//!
//! ## Stages
//! 1. **Keyword score**: weighted occurrence counts over three families
//!    (complexity, frustration, repetition/confusion), English and French.
//!    Below the threshold the answer is `false` and no model is called.
//! 2. **Model judgment**: the intermediate model sees the request and the
//!    sub-scores and answers `{"activate": bool, "reason": "..."}`. If the
//!    call or the parse fails, the stage-1 verdict stands.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chat_strategy_llm::{LlmProvider, LlmRequestOptions, Message};

use super::json_extractor::extract_json_object;
use super::tracker::TaskStatusTracker;
use crate::models::status::PipelineStage;

/// Keyword score at which the model is consulted.
pub const ACTIVATION_THRESHOLD: f32 = 3.0;

const COMPLEXITY_WEIGHT: f32 = 1.0;
const FRUSTRATION_WEIGHT: f32 = 2.0;
const CONFUSION_WEIGHT: f32 = 1.5;

// Keywords match whole words; a trailing `*` marks a stem that also
// matches any word continuing it.
const COMPLEXITY_KEYWORDS: &[&str] = &[
    "explain*",
    "expliqu*",
    "proof",
    "preuve",
    "prouve",
    "mathematical",
    "mathématique",
    "theorem",
    "théorème",
    "demonstrate",
    "démontre",
    "step by step",
    "étape par étape",
    "analyze",
    "analyse",
    "algorithm",
    "complex",
    "equation",
    "équation",
    "derivation",
    "dérivation",
    "in detail",
    "en détail",
    "in depth",
    "en profondeur",
    "optimiz*",
    "optimis*",
    "trade-off",
];

const FRUSTRATION_KEYWORDS: &[&str] = &[
    "wrong",
    "faux",
    "incorrect",
    "doesn't work",
    "does not work",
    "ne marche pas",
    "ne fonctionne pas",
    "useless",
    "inutile",
    "frustrat*",
    "n'importe quoi",
    "not what i asked",
    "pas ce que j'ai demandé",
];

const CONFUSION_KEYWORDS: &[&str] = &[
    "again",
    "encore une fois",
    "still don't",
    "toujours pas",
    "don't understand",
    "do not understand",
    "comprends pas",
    "confus*",
    "what do you mean",
    "c'est-à-dire",
    "clarif*",
];

const DECISION_SYSTEM_PROMPT: &str = r#"You decide whether a chat request needs slow, careful step-by-step reasoning.
Reply with ONLY a JSON object:
{"activate": true or false, "reason": "<one short sentence>"}"#;

/// Stage-1 keyword score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordScore {
    pub complexity: usize,
    pub frustration: usize,
    pub confusion: usize,
}

impl KeywordScore {
    pub fn compute(text: &str) -> Self {
        let lower = text.to_lowercase();
        Self {
            complexity: count_occurrences(
                &lower,
                keyword_pattern(&COMPLEXITY_PATTERN, COMPLEXITY_KEYWORDS),
            ),
            frustration: count_occurrences(
                &lower,
                keyword_pattern(&FRUSTRATION_PATTERN, FRUSTRATION_KEYWORDS),
            ),
            confusion: count_occurrences(
                &lower,
                keyword_pattern(&CONFUSION_PATTERN, CONFUSION_KEYWORDS),
            ),
        }
    }

    pub fn total(&self) -> f32 {
        self.complexity as f32 * COMPLEXITY_WEIGHT
            + self.frustration as f32 * FRUSTRATION_WEIGHT
            + self.confusion as f32 * CONFUSION_WEIGHT
    }

    pub fn reaches_threshold(&self) -> bool {
        self.total() >= ACTIVATION_THRESHOLD
    }
}

static COMPLEXITY_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static FRUSTRATION_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static CONFUSION_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn keyword_pattern(
    cell: &'static OnceLock<Option<Regex>>,
    keywords: &[&str],
) -> Option<&'static Regex> {
    cell.get_or_init(|| {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|kw| match kw.strip_suffix('*') {
                Some(stem) => format!(r"{}\w*", regex::escape(stem)),
                None => format!(r"{}\b", regex::escape(kw)),
            })
            .collect();
        Regex::new(&format!(r"\b(?:{})", alternatives.join("|"))).ok()
    })
    .as_ref()
}

fn count_occurrences(text: &str, pattern: Option<&Regex>) -> usize {
    pattern.map_or(0, |re| re.find_iter(text).count())
}

/// Where the final verdict came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Deep reasoning is switched off in the settings.
    Disabled,
    /// Keyword score below the threshold.
    Keywords,
    /// Intermediate model verdict.
    Model,
    /// Model call or parse failed; keyword verdict used.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningDecision {
    pub activate: bool,
    pub score: KeywordScore,
    pub source: DecisionSource,
    pub reason: String,
}

impl ReasoningDecision {
    /// Placeholder for turns that ended before the decision stage.
    pub fn inactive() -> Self {
        Self {
            activate: false,
            score: KeywordScore::default(),
            source: DecisionSource::Keywords,
            reason: "not evaluated".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelVerdict {
    activate: bool,
    #[serde(default)]
    reason: String,
}

pub struct ReasoningSelector {
    provider: Arc<dyn LlmProvider>,
    intermediate_model: String,
    enabled: bool,
}

impl ReasoningSelector {
    pub fn new(provider: Arc<dyn LlmProvider>, intermediate_model: impl Into<String>) -> Self {
        Self {
            provider,
            intermediate_model: intermediate_model.into(),
            enabled: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Decide for `request`. Never fails; the tracker stage records
    /// whether the model verdict was usable.
    pub async fn decide(&self, request: &str, tracker: &mut TaskStatusTracker) -> ReasoningDecision {
        tracker.start(PipelineStage::DecideReasoning, "Scoring request complexity");

        let score = KeywordScore::compute(request);
        debug!(
            complexity = score.complexity,
            frustration = score.frustration,
            confusion = score.confusion,
            total = score.total(),
            "reasoning: keyword score"
        );

        if !self.enabled {
            tracker.complete(PipelineStage::DecideReasoning, "Deep reasoning disabled");
            return self.finish(tracker, false, score, DecisionSource::Disabled, "disabled in settings");
        }

        if !score.reaches_threshold() {
            tracker.complete(PipelineStage::DecideReasoning, "Standard mode");
            return self.finish(
                tracker,
                false,
                score,
                DecisionSource::Keywords,
                format!("keyword score {:.1} below {:.1}", score.total(), ACTIVATION_THRESHOLD),
            );
        }

        tracker.update(PipelineStage::DecideReasoning, "Asking the model for a second opinion");
        match self.ask_model(request, &score).await {
            Ok(verdict) => {
                let label = if verdict.activate {
                    "Deep reasoning enabled"
                } else {
                    "Standard mode"
                };
                tracker.complete(PipelineStage::DecideReasoning, label);
                self.finish(tracker, verdict.activate, score, DecisionSource::Model, verdict.reason)
            }
            Err(e) => {
                warn!(error = %e, "reasoning: model verdict unavailable, using keyword score");
                let activate = score.reaches_threshold();
                tracker.fail(
                    PipelineStage::DecideReasoning,
                    format!("Model verdict unavailable ({}), using keyword score", e),
                );
                self.finish(tracker, activate, score, DecisionSource::Fallback, e)
            }
        }
    }

    fn finish(
        &self,
        tracker: &mut TaskStatusTracker,
        activate: bool,
        score: KeywordScore,
        source: DecisionSource,
        reason: impl Into<String>,
    ) -> ReasoningDecision {
        tracker.set_deep_reasoning(activate);
        ReasoningDecision {
            activate,
            score,
            source,
            reason: reason.into(),
        }
    }

    async fn ask_model(&self, request: &str, score: &KeywordScore) -> Result<ModelVerdict, String> {
        let prompt = format!(
            "Request:\n{}\n\nKeyword signals: complexity={}, frustration={}, confusion={}, weighted total={:.1} (threshold {:.1}).\nShould deep reasoning be activated?",
            request,
            score.complexity,
            score.frustration,
            score.confusion,
            score.total(),
            ACTIVATION_THRESHOLD
        );

        let response = self
            .provider
            .send_message(
                vec![Message::user(prompt)],
                Some(DECISION_SYSTEM_PROMPT.to_string()),
                LlmRequestOptions::for_model(&self.intermediate_model).with_temperature(0.0),
            )
            .await
            .map_err(|e| e.to_string())?;

        let json = extract_json_object(response.text_or_empty()).map_err(|e| e.to_string())?;
        serde_json::from_str::<ModelVerdict>(json).map_err(|e| format!("invalid verdict: {}", e))
    }
}
