use futures::future::join_all;
use tracing::{info, warn};

use super::MultiQueryError;
use super::combine::{assemble, combine_adjacent};
use super::schema::{AspectQueries, SubQueries};
use crate::markdown::sanitize_heading;
use crate::openai::client::ChatClient;

const DECOMPOSE_SYSTEM: &str = "\
You are an expert in construction project document retrieval.
Analyze the given question from these four perspectives and write one concrete, searchable query per perspective:
1. technical specifications
2. safety and regulations
3. contractual and legal
4. schedule and cost

Respond with only a JSON object of the form:
{\"technical\": \"...\", \"safety\": \"...\", \"contractual\": \"...\", \"schedule\": \"...\"}";

const SUBQUERY_SYSTEM: &str = "\
You are an expert at writing search queries for a RAG system.
For the given perspective, generate 2 to 4 concrete and diverse search queries.
Write each query so it finds the information from a different angle.

Respond with only a JSON object of the form:
{\"queries\": [\"...\", \"...\"]}";

/// One unit of sub-query generation work: an aspect and its 1-based
/// position in the decomposition, used for logging and failure reporting.
#[derive(Debug, Clone)]
pub struct AspectTask {
    pub aspect: String,
    pub number: usize,
}

#[derive(Debug)]
pub struct FailedAspect {
    pub aspect: String,
    pub reason: String,
}

/// Result of one expansion run. Built fresh per invocation.
#[derive(Debug)]
pub struct MultiQueryReport {
    pub original_question: String,
    pub aspects: Vec<String>,
    pub expanded: Vec<String>,
    pub combined: Vec<String>,
    pub queries: Vec<String>,
    pub failed_aspects: Vec<FailedAspect>,
}

/// Decompose a question into one query per fixed aspect.
pub async fn decompose(
    chat: &impl ChatClient,
    question: &str,
) -> Result<Vec<String>, MultiQueryError> {
    let user = format!("Break down the following question: {question}");
    let response = chat.complete(DECOMPOSE_SYSTEM, &user).await?;
    let aspects = AspectQueries::parse(&response)?.into_list();
    info!(aspects = aspects.len(), "question decomposed");
    Ok(aspects)
}

/// One task descriptor per aspect, numbered in aspect order.
pub fn dispatch(aspects: &[String]) -> Vec<AspectTask> {
    aspects
        .iter()
        .enumerate()
        .map(|(i, aspect)| AspectTask {
            aspect: aspect.clone(),
            number: i + 1,
        })
        .collect()
}

async fn generate_subqueries(
    chat: &impl ChatClient,
    task: &AspectTask,
) -> Result<Vec<String>, MultiQueryError> {
    let user = format!(
        "Generate search queries for the following perspective: {}",
        task.aspect
    );
    let response = chat.complete(SUBQUERY_SYSTEM, &user).await?;
    let queries = SubQueries::parse(&response)?;
    info!(task = task.number, count = queries.len(), "sub-queries generated");
    Ok(queries)
}

/// Full expansion workflow: decompose, fan out one generation task per
/// aspect, accumulate the batches, and combine into the final query list.
///
/// Per-aspect failures are aggregated best-effort: the run only fails when
/// every generation task fails (the first error is returned); otherwise the
/// failed aspects are carried in the report.
pub async fn expand(
    chat: &impl ChatClient,
    question: &str,
) -> Result<MultiQueryReport, MultiQueryError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(MultiQueryError::EmptyInput);
    }

    let aspects = decompose(chat, question).await?;
    let tasks = dispatch(&aspects);
    info!(tasks = tasks.len(), "dispatching sub-query generation");

    let task_futures = tasks
        .iter()
        .map(|task| async move { (task, generate_subqueries(chat, task).await) });
    let outcomes = join_all(task_futures).await;

    let mut expanded = Vec::new();
    let mut failures = Vec::new();
    for (task, outcome) in outcomes {
        match outcome {
            Ok(queries) => expanded.extend(queries),
            Err(e) => {
                warn!(task = task.number, error = %e, "sub-query generation failed");
                failures.push((task, e));
            }
        }
    }

    if expanded.is_empty() && !failures.is_empty() {
        let (_, first_err) = failures.remove(0);
        return Err(first_err);
    }

    let failed_aspects = failures
        .into_iter()
        .map(|(task, e)| FailedAspect {
            aspect: task.aspect.clone(),
            reason: e.to_string(),
        })
        .collect::<Vec<_>>();

    let combined = combine_adjacent(&expanded);
    let queries = assemble(question, &expanded, &combined);

    info!(
        queries = queries.len(),
        expanded = expanded.len(),
        failed = failed_aspects.len(),
        "multi-query expansion complete"
    );

    Ok(MultiQueryReport {
        original_question: question.to_string(),
        aspects,
        expanded,
        combined,
        queries,
        failed_aspects,
    })
}

pub fn format_report(report: &MultiQueryReport) -> String {
    let mut output = format!(
        "# Query Expansion: {}\n\n",
        sanitize_heading(&report.original_question)
    );

    output.push_str("## Queries\n\n");
    for (i, query) in report.queries.iter().enumerate() {
        output.push_str(&format!("{}. {query}\n", i + 1));
    }

    output.push_str("\n## Aspects\n\n");
    for (label, aspect) in AspectQueries::LABELS.iter().zip(&report.aspects) {
        output.push_str(&format!("- **{label}**: {aspect}\n"));
    }

    if !report.failed_aspects.is_empty() {
        output.push_str("\n## Failed Aspects\n\n");
        for failed in &report.failed_aspects {
            output.push_str(&format!("- {} ({})\n", failed.aspect, failed.reason));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::client::ChatError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MockChat {
        responses: Mutex<VecDeque<Result<String, ChatError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockChat {
        fn scripted(responses: Vec<Result<String, ChatError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn captured_prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl ChatClient for MockChat {
        async fn complete(&self, _system: &str, user: &str) -> Result<String, ChatError> {
            self.prompts.lock().unwrap().push(user.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ChatError::RateLimited))
        }
    }

    fn aspects_response() -> Result<String, ChatError> {
        Ok(r#"{"technical": "T", "safety": "S", "contractual": "C", "schedule": "D"}"#.into())
    }

    fn subqueries_response(prefix: &str) -> Result<String, ChatError> {
        Ok(format!(r#"{{"queries": ["{prefix}1", "{prefix}2"]}}"#))
    }

    #[tokio::test]
    async fn expand_rejects_empty_question() {
        let mock = MockChat::scripted(vec![]);
        let err = expand(&mock, "   ").await.unwrap_err();
        assert!(matches!(err, MultiQueryError::EmptyInput));
        assert!(mock.captured_prompts().is_empty(), "no model call expected");
    }

    #[tokio::test]
    async fn expand_happy_path_builds_full_report() {
        let mock = MockChat::scripted(vec![
            aspects_response(),
            subqueries_response("t"),
            subqueries_response("s"),
            subqueries_response("c"),
            subqueries_response("d"),
        ]);

        let report = expand(&mock, "How do we pour the slab?").await.unwrap();

        assert_eq!(report.aspects, vec!["T", "S", "C", "D"]);
        assert_eq!(report.expanded.len(), 8);
        assert_eq!(report.combined.len(), 3);
        assert!(report.failed_aspects.is_empty());
        assert_eq!(report.queries[0], "How do we pour the slab?");
        assert!(report.queries.len() <= 10);
        assert!(report.queries.len() >= 5);

        // One decompose prompt plus one per aspect, numbered in order.
        let prompts = mock.captured_prompts();
        assert_eq!(prompts.len(), 5);
        assert!(prompts[0].contains("How do we pour the slab?"));
        assert!(prompts[1].contains("T"));
        assert!(prompts[4].contains("D"));
    }

    #[tokio::test]
    async fn expand_fails_when_decomposition_is_malformed() {
        let mock = MockChat::scripted(vec![Ok("no json here".into())]);
        let err = expand(&mock, "question").await.unwrap_err();
        assert!(matches!(err, MultiQueryError::MalformedOutput { .. }));
        assert_eq!(mock.captured_prompts().len(), 1, "no fan-out after fatal decompose");
    }

    #[tokio::test]
    async fn expand_carries_partial_failures_in_report() {
        let mock = MockChat::scripted(vec![
            aspects_response(),
            subqueries_response("t"),
            Err(ChatError::RateLimited),
            subqueries_response("c"),
            Ok("garbage".into()),
        ]);

        let report = expand(&mock, "question").await.unwrap();

        assert_eq!(report.expanded.len(), 4);
        assert_eq!(report.failed_aspects.len(), 2);
        assert_eq!(report.failed_aspects[0].aspect, "S");
        assert_eq!(report.failed_aspects[1].aspect, "D");
        assert!(report.failed_aspects[0].reason.contains("rate limit"));
    }

    #[tokio::test]
    async fn expand_all_tasks_failing_returns_first_error() {
        let mock = MockChat::scripted(vec![
            aspects_response(),
            Err(ChatError::Timeout(20)),
            Err(ChatError::RateLimited),
            Err(ChatError::RateLimited),
            Err(ChatError::RateLimited),
        ]);

        let err = expand(&mock, "question").await.unwrap_err();
        assert!(
            matches!(err, MultiQueryError::Chat(ChatError::Timeout(_))),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn decompose_yields_four_aspects() {
        let mock = MockChat::scripted(vec![aspects_response()]);
        let aspects = decompose(&mock, "question").await.unwrap();
        assert_eq!(aspects.len(), 4);
    }

    #[test]
    fn dispatch_numbers_tasks_from_one() {
        let aspects: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let tasks = dispatch(&aspects);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].number, 1);
        assert_eq!(tasks[2].number, 3);
        assert_eq!(tasks[2].aspect, "c");
    }

    #[test]
    fn format_report_includes_sections() {
        let report = MultiQueryReport {
            original_question: "multi\nline question".into(),
            aspects: vec!["T".into(), "S".into(), "C".into(), "D".into()],
            expanded: vec!["q1".into()],
            combined: vec![],
            queries: vec!["multi\nline question".into(), "q1".into()],
            failed_aspects: vec![FailedAspect {
                aspect: "S".into(),
                reason: "rate limited".into(),
            }],
        };

        let text = format_report(&report);
        assert!(text.contains("# Query Expansion: multi line question"));
        assert!(text.contains("1. multi\nline question"));
        assert!(text.contains("**safety**: S"));
        assert!(text.contains("## Failed Aspects"));
        assert!(text.contains("- S (rate limited)"));
    }

    #[test]
    fn format_report_omits_failure_section_when_clean() {
        let report = MultiQueryReport {
            original_question: "q".into(),
            aspects: vec!["T".into(), "S".into(), "C".into(), "D".into()],
            expanded: vec![],
            combined: vec![],
            queries: vec!["q".into()],
            failed_aspects: vec![],
        };

        let text = format_report(&report);
        assert!(!text.contains("Failed Aspects"));
    }
}
