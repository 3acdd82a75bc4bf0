//! Ready-made capabilities for answering a free-text query.
//!
//! Two pipelines are provided:
//!
//! - [`Pipeline::Standard`]: [`QueryAnalyzer`] (`Query -> Analysis`) followed by
//!   [`ResponseGenerator`] (`Analysis -> Response`).
//! - [`Pipeline::Smart`]: a single [`SmartAnswer`] (`Query -> SimpleResponse | DetailedResponse`)
//!   that picks the answer style from the query's complexity.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use waspnest_engine::{Capability, CapabilityError, Orchestrator, Reasoning, ReasoningClient};
use waspnest_types::{Contract, ModelId, ResponseShape, State, StructuredResponse};

const ANALYZE_SYSTEM_PROMPT: &str = "Analyze the query for intent and confidence.";
const RESPOND_SYSTEM_PROMPT: &str = "Generate a helpful response.";
const SIMPLE_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Provide clear, concise answers.";
const DETAILED_SYSTEM_PROMPT: &str =
    "You are a helpful expert. Provide detailed answers with explanations and references.";

const COMPLEXITY_WORDS: [&str; 7] = [
    "why",
    "how",
    "explain",
    "describe",
    "compare",
    "analyze",
    "difference",
];
const LONG_QUERY_WORDS: usize = 6;
const COMPLEX_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub intent: String,
    /// The query being analyzed, carried forward for the response step.
    pub query: String,
    pub confidence: f64,
}

impl StructuredResponse for Analysis {
    fn response_shape() -> ResponseShape {
        ResponseShape::record::<Analysis>(json!({
            "intent": {"type": "string"},
            "query": {"type": "string"},
            "confidence": {"type": "number"},
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub message: String,
    pub confidence: f64,
}

impl StructuredResponse for Response {
    fn response_shape() -> ResponseShape {
        ResponseShape::record::<Response>(json!({
            "message": {"type": "string"},
            "confidence": {"type": "number"},
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleResponse {
    pub answer: String,
    pub confidence: f64,
}

impl StructuredResponse for SimpleResponse {
    fn response_shape() -> ResponseShape {
        ResponseShape::record::<SimpleResponse>(json!({
            "answer": {"type": "string"},
            "confidence": {"type": "number"},
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedResponse {
    pub answer: String,
    pub explanation: String,
    pub confidence: f64,
    pub references: Vec<String>,
}

impl StructuredResponse for DetailedResponse {
    fn response_shape() -> ResponseShape {
        ResponseShape::record::<DetailedResponse>(json!({
            "answer": {"type": "string"},
            "explanation": {"type": "string"},
            "confidence": {"type": "number"},
            "references": {"type": "array", "items": {"type": "string"}},
        }))
    }
}

pub struct QueryAnalyzer;

impl Capability for QueryAnalyzer {
    fn contract(&self) -> Option<Contract> {
        Some(Contract::of::<Query, Analysis>())
    }

    fn transform(&self, state: &State, reasoning: &Reasoning<'_>) -> Result<State, CapabilityError> {
        let query = state.payload_as::<Query>()?;
        let analysis: Analysis = reasoning.ask(&query.text, Some(ANALYZE_SYSTEM_PROMPT))?;
        Ok(state.with_payload(analysis))
    }
}

pub struct ResponseGenerator;

impl Capability for ResponseGenerator {
    fn contract(&self) -> Option<Contract> {
        Some(Contract::of::<Analysis, Response>())
    }

    fn transform(&self, state: &State, reasoning: &Reasoning<'_>) -> Result<State, CapabilityError> {
        let analysis = state.payload_as::<Analysis>()?;
        let prompt = format!("Query: {}\nIntent: {}", analysis.query, analysis.intent);
        let response: Response = reasoning.ask(&prompt, Some(RESPOND_SYSTEM_PROMPT))?;
        Ok(state.with_payload(response))
    }
}

/// Answers briefly, or in detail with references when the query looks complex.
pub struct SmartAnswer;

impl SmartAnswer {
    /// 0.8 for long queries containing a "why/how/explain"-style word, 0.5 otherwise.
    #[must_use]
    pub fn complexity(text: &str) -> f64 {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();
        let has_complexity_word = words.iter().any(|word| COMPLEXITY_WORDS.contains(word));
        if has_complexity_word && words.len() > LONG_QUERY_WORDS {
            0.8
        } else {
            0.5
        }
    }
}

impl Capability for SmartAnswer {
    fn contract(&self) -> Option<Contract> {
        Some(Contract::of::<Query, SimpleResponse>().or::<DetailedResponse>())
    }

    fn transform(&self, state: &State, reasoning: &Reasoning<'_>) -> Result<State, CapabilityError> {
        let query = state.payload_as::<Query>()?;
        let complexity = Self::complexity(&query.text);
        tracing::debug!(complexity, "Scored query complexity");

        if complexity > COMPLEX_THRESHOLD {
            let prompt = format!(
                "Give a detailed answer with explanation and references for: {}",
                query.text
            );
            let detailed: DetailedResponse = reasoning.ask(&prompt, Some(DETAILED_SYSTEM_PROMPT))?;
            Ok(state.with_payload(detailed))
        } else {
            let simple: SimpleResponse = reasoning.ask(&query.text, Some(SIMPLE_SYSTEM_PROMPT))?;
            Ok(state.with_payload(simple))
        }
    }
}

/// Which capability set to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pipeline {
    #[default]
    Standard,
    Smart,
}

impl Pipeline {
    #[must_use]
    pub fn build(self, client: Arc<dyn ReasoningClient>, model: ModelId) -> Orchestrator {
        let builder = Orchestrator::builder(client).model(model);
        match self {
            Pipeline::Standard => builder
                .capability(QueryAnalyzer)
                .capability(ResponseGenerator)
                .build(),
            Pipeline::Smart => builder.capability(SmartAnswer).build(),
        }
    }
}
