//! Prompt catalogue.
//!
//! Wording is not a contract; structure is. Generation prompts always carry
//! the question and the schema context. Regeneration prompts add the previous
//! raw answer and why it was rejected. The judging prompt demands a ```json
//! fence with `grade` and `justification`.

use crate::config::PipelineConfig;
use crate::state::RunContext;

fn or_none(text: String) -> String {
    if text.trim().is_empty() {
        "(none)".to_string()
    } else {
        text
    }
}

fn context_sections(config: &PipelineConfig, context: &RunContext) -> String {
    format!(
        "Here is a list of classes relevant to the user's question:\n{classes}\n\n\
         Here is how the properties are used by instances of the classes:\n{properties}\n\n\
         Here are example SPARQL queries that can help you generate the proper query:\n{examples}\n",
        classes = or_none(context.render_classes(&config.prefixes)),
        properties = or_none(context.render_properties(&config.prefixes)),
        examples = or_none(context.render_examples()),
    )
}

/// First attempt.
pub fn generation_prompt(config: &PipelineConfig, context: &RunContext, question: &str) -> String {
    format!(
        "You are an expert in Semantic Web technologies. Your task is to translate a user's question \
         into a SPARQL query that will retrieve information from the {kg}.\n{description}\n\n\
         In your response:\n\
         - Place the SPARQL query inside a markdown codeblock with the ```sparql ``` tag.\n\
         - Limit your response to at most one SPARQL query.\n\
         - Write a SELECT or ASK query.\n\
         - Never mix up classes and instances of these classes.\n\n\
         The user's question is:\n{question}\n\n\
         {sections}",
        kg = config.kg.full_name,
        description = config.kg.description,
        sections = context_sections(config, context),
    )
}

/// Retry after a rejected attempt.
pub fn regeneration_prompt(
    config: &PipelineConfig,
    context: &RunContext,
    question: &str,
    last_answer: &str,
    failure_cause: &str,
) -> String {
    format!(
        "You are a specialized assistant for creating SPARQL queries related to the {kg}.\n\n\
         You are given a previous response that either contains no SPARQL query, or contains a \
         SPARQL query that is not syntactically or semantically correct.\n\
         If no SPARQL query is present, generate one based on the context provided.\n\
         If a non-functional SPARQL query is present, fix it based on the context provided.\n\n\
         When providing a SPARQL query:\n\
         - Place the SPARQL query inside a markdown codeblock with the ```sparql ``` tag.\n\
         - Tailor the query to the details in this prompt; do not write a generic query.\n\
         - Limit your response to at most one SPARQL query.\n\
         - Write a SELECT or ASK query.\n\n\
         The user's question is:\n{question}\n\n\
         {sections}\n\
         Here is the last answer you provided:\n{last_answer}\n\n\
         The verification did not pass because:\n{failure_cause}\n",
        kg = config.kg.full_name,
        sections = context_sections(config, context),
    )
}

/// Grading request for one candidate.
pub fn judge_prompt(question: &str, query: &str, identifier_context: &str) -> String {
    format!(
        "Role: You are a Semantic Web expert grading a SPARQL query against a natural \
         language question.\n\n\
         Your evaluation MUST be a JSON object inside a ```json markdown block, with two fields:\n\
         1. \"grade\" (integer from 1 to 10): 1 = completely incorrect or irrelevant, \
         10 = fully correct and optimal.\n\
         2. \"justification\" (string): explain the grade, focusing on accuracy, completeness, \
         efficiency and syntax.\n\n\
         For example:\n```json\n{{\"grade\": 9, \"justification\": \"Mostly correct, but missing a LIMIT clause.\"}}\n```\n\n\
         Question:\n{question}\n\n\
         SPARQL query:\n```sparql\n{query}\n```\n\n\
         Context of the identifiers used in the query:\n{context}\n",
        context = or_none(identifier_context.to_string()),
    )
}

/// Summarise tabular results for the user.
pub fn interpretation_prompt(config: &PipelineConfig, question: &str, csv_results: &str) -> String {
    format!(
        "You are a specialized assistant helping users interpret the results of SPARQL queries \
         executed against the {kg}.\n\n\
         You are given the user's question and the SPARQL results in CSV format with a header row. \
         Write a clear, concise interpretation of the results.\n\n\
         The user's question was:\n{question}\n\n\
         The SPARQL results are:\n\n{csv_results}\n",
        kg = config.kg.full_name,
    )
}

/// Ask whether the question can be answered from this KG.
pub fn question_check_prompt(config: &PipelineConfig, question: &str) -> String {
    format!(
        "You are a specialized assistant validating questions asked about the {kg} knowledge graph.\n\n\
         Decide whether the question is clear, answerable and relevant to the knowledge graph.\n\n\
         Here is the knowledge graph's description:\n{description}\n\n\
         The user's question is:\n{question}\n\n\
         Answer with the single word \"true\" if the question is valid, or \"false\" if it is not. \
         Do not provide any additional information.\n",
        kg = config.kg.full_name,
        description = config.kg.description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::from_json_str(
            r#"{
              "kg": { "full_name": "Example KG", "description": "People and places.",
                      "sparql_endpoint_url": "http://kg.example/sparql" },
              "judging": { "retry_threshold": 8, "run_threshold": 5 },
              "models": { "generate": { "provider": "ollama", "model": "llama3" } }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn generation_prompt_has_question_and_placeholders_for_missing_context() {
        let p = generation_prompt(&config(), &RunContext::default(), "Who lives in Paris?");
        assert!(p.contains("Example KG"));
        assert!(p.contains("Who lives in Paris?"));
        assert!(p.contains("(none)"));
        assert!(p.contains("Write a SELECT or ASK query."));
        assert!(!p.contains("last answer"));
    }

    #[test]
    fn regeneration_prompt_carries_previous_answer_and_cause() {
        let p = regeneration_prompt(
            &config(),
            &RunContext::default(),
            "Who lives in Paris?",
            "I think SELECT * would do",
            "The last answer did not contain a SPARQL query.",
        );
        assert!(p.contains("I think SELECT * would do"));
        assert!(p.contains("The last answer did not contain a SPARQL query."));
        assert!(p.contains("Who lives in Paris?"));
    }

    #[test]
    fn judge_prompt_demands_json_fence() {
        let p = judge_prompt("q", "SELECT ?s WHERE { ?s ?p ?o }", "");
        assert!(p.contains("```json"));
        assert!(p.contains("\"grade\""));
        assert!(p.contains("```sparql\nSELECT ?s WHERE { ?s ?p ?o }\n```"));
    }
}
