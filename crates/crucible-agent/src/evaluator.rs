//! Evaluator role: asks a model to judge an answer against the rubric.
//!
//! The model replies with JSON holding one assessment per criterion, an
//! overall status and feedback. An answer is approved only when the model
//! says so *and* every rubric criterion is present and passed; a reply that
//! cannot be interpreted yields an `error` verdict.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, from_str, from_value};
use tracing::{debug, error, warn};

use crucible_core::prompts::{fill_template, load_prompt, split_first_paragraph};
use crucible_core::{CallOptions, ChatMessage, Error, EvaluationVerdict, Rubric};
use crucible_providers::ModelGateway;

use crate::traits::TaskEvaluator;

/// Status string the model uses for approval.
const APPROVED: &str = "approved";

/// Verdict JSON as produced by the evaluator model.
#[derive(Debug, Deserialize)]
struct VerdictReply {
    /// Per-criterion judgement keyed by rubric id.
    #[serde(default)]
    assessments: BTreeMap<String, CriterionAssessment>,
    /// Overall status.
    status: String,
    /// Advice for the worker.
    #[serde(default)]
    feedback: String,
}

/// Judgement of one criterion.
#[derive(Debug, Deserialize)]
struct CriterionAssessment {
    /// Whether the criterion is satisfied.
    passed: bool,
    /// Short justification.
    #[serde(default)]
    reasoning: String,
}

/// Evaluator backed by a model reached through the gateway.
pub struct Evaluator {
    gateway: Arc<ModelGateway>,
    model_id: String,
}

impl Evaluator {
    /// Creates an evaluator using `model_id` through `gateway`.
    pub fn new(gateway: Arc<ModelGateway>, model_id: impl Into<String>) -> Self {
        Self {
            gateway,
            model_id: model_id.into(),
        }
    }

    /// Builds the system and user messages for one evaluation.
    ///
    /// # Errors
    /// Returns an error if the embedded prompt cannot be loaded.
    fn build_messages(
        original_prompt: &str,
        worker_response: &str,
        rubric: &Rubric,
    ) -> Result<Vec<ChatMessage>, Error> {
        let template = load_prompt("evaluator").map_err(Error::Other)?;
        let (system, body) = split_first_paragraph(&template);

        let rendered = rubric.render();
        let ids = rubric.ids().collect::<Vec<_>>().join(", ");
        let user = fill_template(
            body,
            &[
                ("original_prompt", original_prompt),
                ("worker_response", worker_response),
                ("rubric", &rendered),
                ("rubric_ids", &ids),
            ],
        );

        Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
    }

    /// Interprets the raw model reply.
    ///
    /// # Errors
    /// Returns an error if no verdict JSON can be extracted from the reply.
    fn parse_verdict(reply: &str, rubric: &Rubric) -> Result<EvaluationVerdict, Error> {
        // Extract JSON from response (in case there's extra text)
        let json_str = match (reply.find('{'), reply.rfind('}')) {
            (Some(start), Some(end)) if start <= end => &reply[start..=end],
            _ => return Err(Error::MalformedVerdict("no JSON object in reply".to_owned())),
        };

        let raw: Value = from_str(json_str)
            .map_err(|err| Error::MalformedVerdict(format!("invalid JSON: {err}")))?;
        let parsed: VerdictReply = from_value(raw.clone())
            .map_err(|err| Error::MalformedVerdict(format!("unexpected verdict shape: {err}")))?;

        let all_passed = rubric.ids().all(|id| {
            parsed
                .assessments
                .get(id)
                .is_some_and(|assessment| assessment.passed)
        });
        let model_approved = parsed.status.trim().eq_ignore_ascii_case(APPROVED);

        if model_approved && all_passed {
            return Ok(EvaluationVerdict::approved(parsed.feedback, Some(raw)));
        }

        if model_approved {
            warn!("Evaluator approved but not every criterion passed; treating as rejected");
        }

        let feedback = if parsed.feedback.trim().is_empty() {
            Self::failed_criteria_feedback(&parsed, rubric)
        } else {
            parsed.feedback
        };
        Ok(EvaluationVerdict::rejected(feedback, Some(raw)))
    }

    /// Feedback assembled from failed or missing criteria.
    fn failed_criteria_feedback(parsed: &VerdictReply, rubric: &Rubric) -> String {
        rubric
            .ids()
            .filter_map(|id| match parsed.assessments.get(id) {
                Some(assessment) if assessment.passed => None,
                Some(assessment) if !assessment.reasoning.trim().is_empty() => {
                    Some(format!("- {id}: {}", assessment.reasoning.trim()))
                }
                Some(_) => Some(format!("- {id}: criterion not met")),
                None => Some(format!("- {id}: no assessment was provided")),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl TaskEvaluator for Evaluator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn evaluate(
        &self,
        original_prompt: &str,
        worker_response: &str,
        rubric: &Rubric,
    ) -> EvaluationVerdict {
        let messages = match Self::build_messages(original_prompt, worker_response, rubric) {
            Ok(messages) => messages,
            Err(err) => {
                error!("Failed to build evaluator prompt: {err}");
                return EvaluationVerdict::error();
            }
        };

        debug!(model = %self.model_id, criteria = rubric.len(), "Requesting evaluation");
        let reply = match self
            .gateway
            .complete(&self.model_id, messages, CallOptions::default())
            .await
        {
            Ok(reply) => reply,
            Err(failure) => {
                warn!(model = %self.model_id, "Evaluator call failed: {failure}");
                return EvaluationVerdict::error();
            }
        };

        match Self::parse_verdict(&reply, rubric) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(
                    model = %self.model_id,
                    category = ?err.category(),
                    "Could not interpret evaluator reply: {err}"
                );
                EvaluationVerdict::error()
            }
        }
    }
}
