//! In-memory fakes for the store, assistant API and executor seams

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use shared::{ContentBlock, HistoryMessage, MessageSender, QueryOutcome, QueryResults};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::StoreError;
use crate::executor::QueryExecutor;
use crate::extract::QueryMap;
use crate::models::{Assistant, NewAssistant};
use crate::openai::{
    AssistantApi, AssistantApiError, RemoteAssistant, Run, RunStatus, Thread, ThreadMessage,
};
use crate::orchestrator::{Orchestrator, PollPolicy};
use crate::registry::AssistantRegistry;
use crate::store::{AssistantStore, ChatStore, Exchange};
use crate::AppState;

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

#[derive(Default)]
struct StoreState {
    assistants: Vec<Assistant>,
    /// Keyed by owning assistant and thread id
    chats: HashMap<(Uuid, String), Vec<HistoryMessage>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    failing: bool,
}

impl MemoryStore {
    /// A store whose every operation fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn assistants(&self) -> Vec<Assistant> {
        self.state.lock().unwrap().assistants.clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing {
            Err(StoreError::Join("store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AssistantStore for MemoryStore {
    async fn insert(&self, new_assistant: NewAssistant) -> Result<Assistant, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let stamp = base_time() + ChronoDuration::seconds(state.assistants.len() as i64);
        let assistant = Assistant {
            id: Uuid::new_v4(),
            assistant_id: new_assistant.assistant_id,
            agent_name: new_assistant.agent_name,
            sql_username: new_assistant.sql_username,
            sql_password: new_assistant.sql_password,
            instructions: new_assistant.instructions,
            description: new_assistant.description,
            photo_option: new_assistant.photo_option,
            tables: new_assistant.tables,
            assistant_types: new_assistant.assistant_types,
            user_selected_model: new_assistant.user_selected_model,
            is_deleted: false,
            created_at: stamp,
            updated_at: stamp,
        };
        state.assistants.push(assistant.clone());
        Ok(assistant)
    }

    async fn list_active(&self) -> Result<Vec<Assistant>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .assistants
            .iter()
            .rev()
            .filter(|a| !a.is_deleted)
            .cloned()
            .collect())
    }

    async fn find_active(&self, assistant_id: &str) -> Result<Option<Assistant>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .assistants
            .iter()
            .find(|a| a.assistant_id == assistant_id && !a.is_deleted)
            .cloned())
    }

    async fn soft_delete(&self, assistant_id: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        match state
            .assistants
            .iter_mut()
            .find(|a| a.assistant_id == assistant_id && !a.is_deleted)
        {
            Some(assistant) => {
                assistant.is_deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn record_exchange(
        &self,
        assistant: Uuid,
        thread_id: &str,
        exchange: Exchange,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let messages = state
            .chats
            .entry((assistant, thread_id.to_string()))
            .or_default();
        messages.push(HistoryMessage {
            sender: MessageSender::User,
            content: exchange.question,
            timestamp: exchange.asked_at,
        });
        messages.push(HistoryMessage {
            sender: MessageSender::Assistant,
            content: exchange.answer,
            timestamp: exchange.answered_at,
        });
        Ok(())
    }

    async fn history(
        &self,
        assistant: Uuid,
        thread_id: &str,
    ) -> Result<Option<Vec<HistoryMessage>>, StoreError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .chats
            .get(&(assistant, thread_id.to_string()))
            .cloned())
    }
}

#[derive(Default)]
struct ApiState {
    created_assistants: Vec<(String, String, String)>,
    threads: usize,
    posted: Vec<String>,
    /// Status checks made per run, indexed by run number
    checks: Vec<usize>,
}

/// Scripted assistant API.
///
/// Run `n` answers with the `n`th scripted reply. Every run walks the same
/// status script, staying on its last entry; without a script runs complete
/// immediately.
pub struct FakeAssistantApi {
    state: Mutex<ApiState>,
    replies: Vec<String>,
    statuses: Vec<RunStatus>,
    assistant_ids: bool,
}

impl FakeAssistantApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ApiState::default()),
            replies: Vec::new(),
            statuses: Vec::new(),
            assistant_ids: true,
        }
    }

    pub fn with_replies<const N: usize>(mut self, replies: [&str; N]) -> Self {
        self.replies = replies.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_statuses<const N: usize>(mut self, statuses: [RunStatus; N]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    /// Assistant creation responds without an id
    pub fn without_assistant_ids(mut self) -> Self {
        self.assistant_ids = false;
        self
    }

    pub fn assistants_created(&self) -> usize {
        self.state.lock().unwrap().created_assistants.len()
    }

    pub fn last_created_assistant(&self) -> Option<(String, String, String)> {
        self.state.lock().unwrap().created_assistants.last().cloned()
    }

    pub fn threads_created(&self) -> usize {
        self.state.lock().unwrap().threads
    }

    pub fn posted_messages(&self) -> Vec<String> {
        self.state.lock().unwrap().posted.clone()
    }

    pub fn runs_created(&self) -> usize {
        self.state.lock().unwrap().checks.len()
    }

    /// Total status checks across all runs
    pub fn status_checks(&self) -> usize {
        self.state.lock().unwrap().checks.iter().sum()
    }

    fn status_at(&self, check: usize) -> RunStatus {
        self.statuses
            .get(check)
            .or(self.statuses.last())
            .copied()
            .unwrap_or(RunStatus::Completed)
    }

    fn run_number(run_id: &str) -> usize {
        run_id
            .trim_start_matches("run_")
            .parse::<usize>()
            .unwrap_or(0)
    }
}

#[async_trait]
impl AssistantApi for FakeAssistantApi {
    async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        model: &str,
    ) -> Result<RemoteAssistant, AssistantApiError> {
        let mut state = self.state.lock().unwrap();
        state
            .created_assistants
            .push((name.to_string(), instructions.to_string(), model.to_string()));
        let id = format!("asst_{}", state.created_assistants.len());
        Ok(RemoteAssistant {
            id: self.assistant_ids.then_some(id),
            name: Some(name.to_string()),
            model: Some(model.to_string()),
        })
    }

    async fn create_thread(&self) -> Result<Thread, AssistantApiError> {
        let mut state = self.state.lock().unwrap();
        state.threads += 1;
        Ok(Thread {
            id: format!("thread_{}", state.threads),
        })
    }

    async fn add_user_message(
        &self,
        _thread_id: &str,
        content: &str,
    ) -> Result<(), AssistantApiError> {
        self.state.lock().unwrap().posted.push(content.to_string());
        Ok(())
    }

    async fn create_run(
        &self,
        _thread_id: &str,
        _assistant_id: &str,
    ) -> Result<Run, AssistantApiError> {
        let mut state = self.state.lock().unwrap();
        state.checks.push(0);
        Ok(Run {
            id: format!("run_{}", state.checks.len()),
            status: self.status_at(0),
            last_error: None,
        })
    }

    async fn retrieve_run(&self, _thread_id: &str, run_id: &str) -> Result<Run, AssistantApiError> {
        let mut state = self.state.lock().unwrap();
        let number = Self::run_number(run_id);
        if number == 0 || number > state.checks.len() {
            return Err(AssistantApiError::Status {
                status: 404,
                message: format!("No run found with id '{}'.", run_id),
            });
        }
        state.checks[number - 1] += 1;
        let status = self.status_at(state.checks[number - 1]);
        Ok(Run {
            id: run_id.to_string(),
            status,
            last_error: None,
        })
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantApiError> {
        let state = self.state.lock().unwrap();
        let runs = state.checks.len();
        Ok(self
            .replies
            .iter()
            .take(runs)
            .enumerate()
            .map(|(i, reply)| ThreadMessage {
                id: format!("msg_{}", i + 1),
                role: "assistant".to_string(),
                run_id: Some(format!("run_{}", i + 1)),
                content: vec![ContentBlock::text(reply.as_str())],
            })
            .rev()
            .collect())
    }
}

/// Executor that answers every query with the same rows
#[derive(Default)]
pub struct FakeExecutor {
    rows: Vec<serde_json::Value>,
    calls: Mutex<Vec<QueryMap>>,
}

impl FakeExecutor {
    pub fn returning(rows: serde_json::Value) -> Self {
        Self {
            rows: match rows {
                serde_json::Value::Array(rows) => rows,
                other => vec![other],
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<QueryMap> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn execute(&self, queries: QueryMap) -> QueryResults {
        let results = queries
            .keys()
            .map(|label| {
                (
                    label.clone(),
                    QueryOutcome::Success {
                        rows: self.rows.clone(),
                    },
                )
            })
            .collect();
        self.calls.lock().unwrap().push(queries);
        results
    }
}

/// Application state wired entirely to in-memory fakes
pub fn test_state(api: Arc<FakeAssistantApi>, store: Arc<MemoryStore>) -> Arc<AppState> {
    let executor = Arc::new(FakeExecutor::returning(serde_json::json!([{"total": 42}])));
    Arc::new(AppState {
        registry: AssistantRegistry::new(store.clone(), api.clone(), "gpt-4-turbo"),
        chats: store,
        orchestrator: Orchestrator::new(api, executor, PollPolicy::default()),
        shutdown: CancellationToken::new(),
    })
}
