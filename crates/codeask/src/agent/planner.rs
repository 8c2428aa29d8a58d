//! Search planning before the first round.
//!
//! The planner is optional: every failure (call error, short output,
//! malformed JSON) yields `None` and the loop proceeds without a plan.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::config::PlannerConfig;
use super::prompt::{BEHAVIOR_INSTRUCTIONS, EXECUTION_PLANNER_PROMPT, SEARCH_PLANNER_PROMPT};
use crate::ChatRequest;
use crate::api::provider::{ModelProvider, complete};
use crate::tools::kind::ToolKind;

/// Shortest plan text accepted from the model.
pub const MIN_PLAN_CHARS: usize = 20;

pub const MAX_PLAN_STEPS: usize = 6;

/// A plan produced once per question, read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Free-text search strategy.
    Search(String),
    Execution(ExecutionPlan),
}

impl Plan {
    pub fn label(&self) -> String {
        match self {
            Plan::Search(_) => "free-text".into(),
            Plan::Execution(p) => format!("{} steps", p.steps.len()),
        }
    }

    /// Markdown rendering appended to the first user turn.
    pub fn render(&self) -> String {
        match self {
            Plan::Search(text) => text.trim().to_string(),
            Plan::Execution(plan) => {
                let mut out = format!("Intent: {}\n", plan.intent);
                for step in &plan.steps {
                    let args = Value::Object(step.arguments.clone());
                    out.push_str(&format!(
                        "{}. {} via {}({}); done when: {}\n",
                        step.id, step.action, step.tool, args, step.success_criteria
                    ));
                }
                if plan.min_steps_before_answer > 0 {
                    out.push_str(&format!(
                        "Complete at least {} steps before answering.\n",
                        plan.min_steps_before_answer
                    ));
                }
                if !plan.expected_files.is_empty() {
                    out.push_str(&format!(
                        "Likely files: {}\n",
                        plan.expected_files.join(", ")
                    ));
                }
                out
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub intent: String,
    pub steps: Vec<PlanStep>,
    pub min_steps_before_answer: u32,
    #[serde(default)]
    pub expected_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub id: u32,
    pub action: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    pub success_criteria: String,
}

/// Parse untrusted model output into an [`ExecutionPlan`].
///
/// Accepts the JSON bare, inside a ```` ```json ```` or bare ```` ``` ````
/// fence, or embedded in prose. Returns `None` on any missing field, an
/// empty or oversized step list, or a step naming an unknown or
/// write-capable tool.
pub fn parse_execution_plan(text: &str) -> Option<ExecutionPlan> {
    let unfenced = strip_code_fence(text);
    let json = outermost_object(unfenced)?;
    let plan: ExecutionPlan = match serde_json::from_str(json) {
        Ok(p) => p,
        Err(e) => {
            debug!("Execution plan rejected: {e}");
            return None;
        }
    };
    validate_plan(&plan).then_some(plan)
}

fn validate_plan(plan: &ExecutionPlan) -> bool {
    if plan.intent.trim().is_empty()
        || plan.steps.is_empty()
        || plan.steps.len() > MAX_PLAN_STEPS
    {
        return false;
    }
    plan.steps.iter().all(|s| {
        !s.action.trim().is_empty()
            && !s.success_criteria.trim().is_empty()
            && ToolKind::from_name(&s.tool).is_ok_and(|kind| !kind.is_write())
    })
}

/// Content of the first fenced block, or the input when there is none.
fn strip_code_fence(text: &str) -> &str {
    let Some((_, after_open)) = text.split_once("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening line.
    let body = after_open.split_once('\n').map_or(after_open, |(_, b)| b);
    body.split_once("```").map_or(body, |(inner, _)| inner)
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    text.get(start..=end)
}

async fn plan_call<P: ModelProvider + ?Sized>(
    provider: &P,
    model: &str,
    config: &PlannerConfig,
    system: &str,
    question: &str,
    project_context: Option<&str>,
) -> Option<String> {
    let mut user = format!("Question: {question}");
    if let Some(ctx) = project_context.filter(|c| !c.trim().is_empty()) {
        user.push_str(&format!("\n\nProject context:\n{ctx}"));
    }
    let request = ChatRequest::one_shot(model, system, user, config.max_tokens, config.temperature);
    match complete(provider, &request).await {
        Ok(done) => Some(done.text),
        Err(e) => {
            warn!("Planner call failed, continuing without a plan: {e}");
            None
        }
    }
}

/// Free-text search plan, or `None` if the call fails or returns under
/// [`MIN_PLAN_CHARS`] characters.
pub async fn generate_search_plan<P: ModelProvider + ?Sized>(
    provider: &P,
    model: &str,
    config: &PlannerConfig,
    question: &str,
    project_context: Option<&str>,
) -> Option<String> {
    let text = plan_call(
        provider,
        model,
        config,
        SEARCH_PLANNER_PROMPT,
        question,
        project_context,
    )
    .await?;
    let text = text.trim();
    if text.chars().count() < MIN_PLAN_CHARS {
        debug!("Search plan too short ({} chars), ignoring", text.len());
        return None;
    }
    Some(text.to_string())
}

/// Structured plan, or `None` on any failure.
pub async fn generate_execution_plan<P: ModelProvider + ?Sized>(
    provider: &P,
    model: &str,
    config: &PlannerConfig,
    question: &str,
    project_context: Option<&str>,
) -> Option<ExecutionPlan> {
    let text = plan_call(
        provider,
        model,
        config,
        EXECUTION_PLANNER_PROMPT,
        question,
        project_context,
    )
    .await?;
    let plan = parse_execution_plan(&text);
    if plan.is_none() {
        warn!("Execution plan could not be parsed, continuing without a plan");
    }
    plan
}

/// Generate whichever plan `config` asks for.
pub async fn generate_plan<P: ModelProvider + ?Sized>(
    provider: &P,
    model: &str,
    config: &PlannerConfig,
    question: &str,
    project_context: Option<&str>,
) -> Option<Plan> {
    if config.structured {
        generate_execution_plan(provider, model, config, question, project_context)
            .await
            .map(Plan::Execution)
    } else {
        generate_search_plan(provider, model, config, question, project_context)
            .await
            .map(Plan::Search)
    }
}

/// First user turn: the question, the plan if any, and behavioral rules.
pub fn enrich_user_prompt(question: &str, plan: Option<&Plan>) -> String {
    let mut out = question.trim().to_string();
    if let Some(plan) = plan {
        out.push_str("\n\n## Search plan\n");
        out.push_str(&plan.render());
    }
    out.push_str("\n\n");
    out.push_str(BEHAVIOR_INSTRUCTIONS);
    out
}
