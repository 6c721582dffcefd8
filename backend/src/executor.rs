//! Runs labelled SQL queries against the analytics database

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::Json;
use diesel::PgConnection;
use shared::{QueryOutcome, QueryResults};
use tracing::{debug, error, warn};

use crate::db::DbPool;
use crate::extract::QueryMap;

/// Upper bound for a single generated statement
const STATEMENT_TIMEOUT: &str = "30s";

/// A connection that can run one statement and hand back its rows as JSON objects
pub trait SqlRows {
    fn query_rows(&mut self, sql: &str) -> Result<Vec<serde_json::Value>, String>;
}

#[derive(QueryableByName)]
struct JsonRows {
    #[diesel(sql_type = Json)]
    rows: serde_json::Value,
}

impl SqlRows for PgConnection {
    fn query_rows(&mut self, sql: &str) -> Result<Vec<serde_json::Value>, String> {
        let wrapped = wrap_statement(sql);

        self.build_transaction()
            .read_only()
            .run(|conn| {
                diesel::sql_query(format!("SET LOCAL statement_timeout = '{}'", STATEMENT_TIMEOUT))
                    .execute(conn)?;
                diesel::sql_query(wrapped).get_result::<JsonRows>(conn)
            })
            .map(|result| match result.rows {
                serde_json::Value::Array(rows) => rows,
                other => vec![other],
            })
            .map_err(|e: diesel::result::Error| e.to_string())
    }
}

/// Wrap a statement so its rows come back as one JSON array.
///
/// The statement sits on its own lines so a trailing `--` comment cannot
/// swallow the closing parenthesis.
pub fn wrap_statement(sql: &str) -> String {
    format!(
        "SELECT COALESCE(json_agg(q), '[]'::json) AS rows FROM (\n{}\n) AS q",
        strip_terminator(sql).trim()
    )
}

/// Drop the trailing `;` terminators, looking past comments and leaving
/// semicolons inside string literals alone
fn strip_terminator(sql: &str) -> String {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let mut trailing: Vec<usize> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i].1;
        let next = chars.get(i + 1).map(|&(_, n)| n);
        match c {
            '-' if next == Some('-') => {
                while i < chars.len() && chars[i].1 != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if next == Some('*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i].1 == '*' && chars[i + 1].1 == '/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            '\'' | '"' => {
                i += 1;
                while i < chars.len() && chars[i].1 != c {
                    i += 1;
                }
                trailing.clear();
            }
            ';' => trailing.push(chars[i].0),
            c if c.is_whitespace() => {}
            _ => trailing.clear(),
        }
        i += 1;
    }

    sql.char_indices()
        .filter(|(pos, _)| !trailing.contains(pos))
        .map(|(_, c)| c)
        .collect()
}

/// Run every query in map order on one connection.
///
/// A failing statement is logged and recorded as [`QueryOutcome::Failed`];
/// the remaining statements still run.
pub fn execute_on<C>(conn: &mut C, queries: &QueryMap) -> QueryResults
where
    C: SqlRows + ?Sized,
{
    let mut results = QueryResults::with_capacity(queries.len());

    for (label, sql) in queries {
        let outcome = match conn.query_rows(sql) {
            Ok(rows) => {
                debug!("Query {:?} returned {} rows", label, rows.len());
                QueryOutcome::Success { rows }
            }
            Err(reason) => {
                warn!("Error in {:?}: {}", label, reason);
                QueryOutcome::Failed { reason }
            }
        };
        results.insert(label.clone(), outcome);
    }

    results
}

fn fail_all<'a>(labels: impl IntoIterator<Item = &'a String>, reason: &str) -> QueryResults {
    labels
        .into_iter()
        .map(|label| {
            (
                label.clone(),
                QueryOutcome::Failed {
                    reason: reason.to_string(),
                },
            )
        })
        .collect()
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, queries: QueryMap) -> QueryResults;
}

/// Executor backed by the analytics connection pool
pub struct AnalyticsDb {
    pool: DbPool,
}

impl AnalyticsDb {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryExecutor for AnalyticsDb {
    async fn execute(&self, queries: QueryMap) -> QueryResults {
        let pool = self.pool.clone();
        let labels: Vec<String> = queries.keys().cloned().collect();

        let joined = tokio::task::spawn_blocking(move || match pool.get() {
            Ok(mut conn) => execute_on(&mut *conn, &queries),
            Err(e) => {
                error!("Analytics database unavailable: {}", e);
                fail_all(queries.keys(), &format!("analytics database unavailable: {}", e))
            }
        })
        .await;

        match joined {
            Ok(results) => results,
            Err(e) => {
                error!("Query execution task failed: {}", e);
                fail_all(&labels, "query execution aborted")
            }
        }
    }
}
