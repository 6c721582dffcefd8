//! One conversational turn against an assistant.
//!
//! A turn posts the question, waits for the run, pulls any SQL out of the
//! reply, executes it and, when there was something to run, asks the
//! assistant a second time with the results attached.

use shared::QueryResults;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::executor::QueryExecutor;
use crate::extract::{extract_queries, flatten};
use crate::openai::{AssistantApi, AssistantApiError, Run, RunStatus, ThreadMessage};

/// How a run is polled until it reaches a terminal status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first status check
    pub interval: Duration,
    /// Cap for the growing delay
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each check (values below 1 are treated as 1)
    pub backoff: f64,
    /// Overall budget for one run
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(5),
            backoff: 1.5,
            max_wait: Duration::from_secs(120),
        }
    }
}

impl PollPolicy {
    pub fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff.max(1.0)).min(self.max_interval)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Api(#[from] AssistantApiError),

    #[error("run {run_id} ended with status {status}")]
    RunFailed { run_id: String, status: RunStatus },

    #[error("run {run_id} still {last_status} after {waited:?}")]
    Timeout {
        run_id: String,
        last_status: RunStatus,
        waited: Duration,
    },

    #[error("turn cancelled")]
    Cancelled,

    #[error("run {0} completed without an assistant reply")]
    NoReply(String),
}

impl From<TurnError> for AppError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Timeout { waited, .. } => AppError::Timeout(waited),
            TurnError::Cancelled => AppError::Cancelled,
            other => AppError::Upstream(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub assistant_id: &'a str,
    pub question: &'a str,
    /// Existing thread to continue; `None` starts a new one
    pub thread_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub thread_id: String,
    pub created_thread: bool,
    /// Final assistant message of the turn
    pub reply: ThreadMessage,
    /// Empty when the first reply contained no queries
    pub query_results: QueryResults,
}

pub struct Orchestrator {
    api: Arc<dyn AssistantApi>,
    executor: Arc<dyn QueryExecutor>,
    policy: PollPolicy,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        executor: Arc<dyn QueryExecutor>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            api,
            executor,
            policy,
        }
    }

    #[tracing::instrument(
        skip(self, request, cancel),
        fields(assistant_id = request.assistant_id, thread_id = ?request.thread_id)
    )]
    pub async fn run_turn(
        &self,
        request: TurnRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let (thread_id, created_thread) = self.resolve_thread(request.thread_id).await?;

        let first = self
            .ask(&thread_id, request.assistant_id, request.question, cancel)
            .await?;

        let queries = flatten(extract_queries(&first.content));
        if queries.is_empty() {
            debug!("No queries in reply on thread {}", thread_id);
            return Ok(TurnOutcome {
                thread_id,
                created_thread,
                reply: first,
                query_results: QueryResults::new(),
            });
        }

        info!("Executing {} queries for thread {}", queries.len(), thread_id);
        let query_results = self.executor.execute(queries).await;

        let follow_up = follow_up_message(&query_results, request.question);
        let reply = self
            .ask(&thread_id, request.assistant_id, &follow_up, cancel)
            .await?;

        Ok(TurnOutcome {
            thread_id,
            created_thread,
            reply,
            query_results,
        })
    }

    async fn resolve_thread(&self, thread_id: Option<&str>) -> Result<(String, bool), TurnError> {
        match thread_id.filter(|id| !id.is_empty()) {
            Some(id) => Ok((id.to_string(), false)),
            None => {
                let thread = self.api.create_thread().await?;
                info!("Created thread {}", thread.id);
                Ok((thread.id, true))
            }
        }
    }

    /// Post a user message, run the assistant and return its reply
    async fn ask(
        &self,
        thread_id: &str,
        assistant_id: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<ThreadMessage, TurnError> {
        self.api.add_user_message(thread_id, content).await?;
        let run = self.api.create_run(thread_id, assistant_id).await?;
        debug!("Started run {} on thread {}", run.id, thread_id);

        let run_id = run.id.clone();
        self.wait_for_run(thread_id, run, cancel).await?;

        self.api
            .list_messages(thread_id)
            .await?
            .into_iter()
            .find(|m| m.is_assistant() && m.run_id.as_deref() == Some(run_id.as_str()))
            .ok_or(TurnError::NoReply(run_id))
    }

    async fn wait_for_run(
        &self,
        thread_id: &str,
        mut run: Run,
        cancel: &CancellationToken,
    ) -> Result<(), TurnError> {
        let started = Instant::now();
        let mut interval = self.policy.interval;

        loop {
            if run.status == RunStatus::Completed {
                return Ok(());
            }
            if run.status.is_failure() {
                let reason = run
                    .last_error
                    .as_ref()
                    .and_then(|e| e.message.as_deref())
                    .unwrap_or("no error reported");
                warn!(
                    "Run {} on thread {} ended with {}: {}",
                    run.id, thread_id, run.status, reason
                );
                return Err(TurnError::RunFailed {
                    run_id: run.id,
                    status: run.status,
                });
            }

            let waited = started.elapsed();
            if waited >= self.policy.max_wait {
                return Err(TurnError::Timeout {
                    run_id: run.id,
                    last_status: run.status,
                    waited,
                });
            }

            let pause = interval.min(self.policy.max_wait - waited);
            tokio::select! {
                _ = cancel.cancelled() => return Err(TurnError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }

            run = self.api.retrieve_run(thread_id, &run.id).await?;
            interval = self.policy.next_interval(interval);
        }
    }
}

fn follow_up_message(results: &QueryResults, question: &str) -> String {
    let json = serde_json::to_string(results).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Here are the SQL query results: {}. Based on this data, answer the original question: {}",
        json, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeAssistantApi, FakeExecutor};
    use serde_json::json;
    use shared::QueryOutcome;

    const QUERY_REPLY: &str = r#"Let me look that up.
"Total sales": """SELECT SUM(amount)
    FROM orders""""#;

    fn orchestrator(api: Arc<FakeAssistantApi>, executor: Arc<FakeExecutor>) -> Orchestrator {
        Orchestrator::new(api, executor, PollPolicy::default())
    }

    fn request<'a>(question: &'a str, thread_id: Option<&'a str>) -> TurnRequest<'a> {
        TurnRequest {
            assistant_id: "asst_1",
            question,
            thread_id,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = PollPolicy::default();
        let mut interval = policy.interval;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(interval.as_millis());
            interval = policy.next_interval(interval);
        }
        assert_eq!(seen, vec![1000, 1500, 2250, 3375, 5000, 5000]);
    }

    #[test]
    fn test_backoff_below_one_does_not_shrink() {
        let policy = PollPolicy {
            backoff: 0.5,
            ..PollPolicy::default()
        };
        assert_eq!(policy.next_interval(Duration::from_secs(2)), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_answer_creates_thread_once_and_skips_execution() {
        let api = Arc::new(FakeAssistantApi::new().with_replies(["Hello there"]));
        let executor = Arc::new(FakeExecutor::default());

        let outcome = orchestrator(api.clone(), executor.clone())
            .run_turn(request("Hi", None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.thread_id, "thread_1");
        assert!(outcome.created_thread);
        assert_eq!(outcome.reply.text(), "Hello there");
        assert!(outcome.query_results.is_empty());
        assert_eq!(api.threads_created(), 1);
        assert_eq!(api.posted_messages(), vec!["Hi".to_string()]);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_thread_is_reused() {
        let api = Arc::new(FakeAssistantApi::new().with_replies(["ok"]));
        let executor = Arc::new(FakeExecutor::default());

        let outcome = orchestrator(api.clone(), executor)
            .run_turn(request("Hi", Some("thread_existing")), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.thread_id, "thread_existing");
        assert!(!outcome.created_thread);
        assert_eq!(api.threads_created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_are_executed_and_sent_back() {
        let api = Arc::new(
            FakeAssistantApi::new().with_replies([QUERY_REPLY, "Total sales were 42."]),
        );
        let executor = Arc::new(FakeExecutor::returning(json!([{"sum": 42}])));

        let outcome = orchestrator(api.clone(), executor.clone())
            .run_turn(request("What were total sales?", None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.reply.text(), "Total sales were 42.");
        assert_eq!(
            outcome.query_results["Total sales"],
            QueryOutcome::Success {
                rows: vec![json!({"sum": 42})]
            }
        );

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["Total sales"], "SELECT SUM(amount) FROM orders");

        let posted = api.posted_messages();
        assert_eq!(posted.len(), 2);
        assert!(posted[1].starts_with(
            r#"Here are the SQL query results: {"Total sales":{"status":"ok","rows":[{"sum":42}]}}"#
        ));
        assert!(posted[1].ends_with("answer the original question: What were total sales?"));
        assert_eq!(api.runs_created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_completed() {
        let api = Arc::new(
            FakeAssistantApi::new()
                .with_replies(["done"])
                .with_statuses([RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed]),
        );
        let executor = Arc::new(FakeExecutor::default());

        let started = Instant::now();
        let outcome = orchestrator(api.clone(), executor)
            .run_turn(request("Hi", None), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.reply.text(), "done");
        assert_eq!(api.status_checks(), 2);
        // 1s then 1.5s of paused time
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2500), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2600), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_is_upstream_error() {
        let api = Arc::new(
            FakeAssistantApi::new()
                .with_replies(["never seen"])
                .with_statuses([RunStatus::InProgress, RunStatus::Failed]),
        );
        let executor = Arc::new(FakeExecutor::default());

        let err = orchestrator(api, executor)
            .run_turn(request("Hi", None), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TurnError::RunFailed {
                status: RunStatus::Failed,
                ..
            }
        ));
        assert!(matches!(AppError::from(err), AppError::Upstream(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_run_times_out() {
        let api = Arc::new(
            FakeAssistantApi::new()
                .with_replies(["never seen"])
                .with_statuses([RunStatus::InProgress]),
        );
        let executor = Arc::new(FakeExecutor::default());
        let policy = PollPolicy {
            max_wait: Duration::from_secs(10),
            ..PollPolicy::default()
        };

        let err = Orchestrator::new(api, executor, policy)
            .run_turn(request("Hi", None), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            TurnError::Timeout {
                last_status,
                waited,
                ..
            } => {
                assert_eq!(last_status, RunStatus::InProgress);
                assert!(waited >= Duration::from_secs(10), "{:?}", waited);
                assert!(waited < Duration::from_secs(11), "{:?}", waited);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_stops_polling() {
        let api = Arc::new(
            FakeAssistantApi::new()
                .with_replies(["never seen"])
                .with_statuses([RunStatus::InProgress]),
        );
        let executor = Arc::new(FakeExecutor::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator(api.clone(), executor)
            .run_turn(request("Hi", None), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::Cancelled));
        assert_eq!(api.status_checks(), 0);
        assert!(matches!(AppError::from(err), AppError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_reply_is_reported() {
        let api = Arc::new(FakeAssistantApi::new());
        let executor = Arc::new(FakeExecutor::default());

        let err = orchestrator(api, executor)
            .run_turn(request("Hi", None), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, TurnError::NoReply(_)));
    }
}
