use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::{
  ActionKind, HostStatus, NewTask, Store, StoreError, TaskAction, TaskHost, TaskMeta, TaskQuery,
  TaskTemplate,
};

const TASK_COLUMNS: &str = "id, title, account, batch, tolerance, timeout, pause, script, args, creator, created_at";

/// SQLite-based store implementation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url` and run migrations.
  pub async fn connect(url: &str) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// A migrated private in-memory database.
  ///
  /// The pool keeps exactly one connection alive for its whole lifetime,
  /// since every in-memory connection is a separate database.
  pub async fn in_memory() -> Result<Self, StoreError> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect("sqlite::memory:")
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }

  fn push_filter<'a>(builder: &mut QueryBuilder<'a, Sqlite>, query: &'a TaskQuery) {
    builder.push(" WHERE created_at >= ").push_bind(query.since);

    if let Some(creator) = query.creator.as_deref().filter(|c| !c.is_empty()) {
      builder.push(" AND creator = ").push_bind(creator);
    }

    if let Some(text) = query.query.as_deref() {
      for token in text.split_whitespace() {
        builder
          .push(" AND title LIKE ")
          .push_bind(format!("%{}%", escape_like(token)))
          .push(" ESCAPE '\\'");
      }
    }
  }
}

/// Escape `LIKE` wildcards so a token only matches itself.
fn escape_like(token: &str) -> String {
  let mut escaped = String::with_capacity(token.len());
  for c in token.chars() {
    if matches!(c, '\\' | '%' | '_') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped
}

#[async_trait]
impl Store for SqliteStore {
  async fn create_task(
    &self,
    task: &NewTask,
    hosts: &[String],
    action: ActionKind,
  ) -> Result<TaskMeta, StoreError> {
    let created_at = Utc::now();
    let mut tx = self.pool.begin().await?;

    let id = sqlx::query(
      r#"
            INSERT INTO task_meta (title, account, batch, tolerance, timeout, pause, script, args, creator, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&task.title)
    .bind(&task.account)
    .bind(task.batch)
    .bind(task.tolerance)
    .bind(task.timeout)
    .bind(&task.pause)
    .bind(&task.script)
    .bind(&task.args)
    .bind(&task.creator)
    .bind(created_at)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for host in hosts {
      sqlx::query(
        r#"
            INSERT INTO task_host (id, host, status, stdout, stderr)
            VALUES (?, ?, ?, '', '')
            "#,
      )
      .bind(id)
      .bind(host)
      .bind(HostStatus::Pending)
      .execute(&mut *tx)
      .await?;
    }

    sqlx::query(
      r#"
            INSERT INTO task_action (id, action, updated_at)
            VALUES (?, ?, ?)
            "#,
    )
    .bind(id)
    .bind(action)
    .bind(created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    debug!(task_id = id, hosts = hosts.len(), action = %action, "task persisted");

    Ok(TaskMeta {
      id,
      title: task.title.clone(),
      account: task.account.clone(),
      batch: task.batch,
      tolerance: task.tolerance,
      timeout: task.timeout,
      pause: task.pause.clone(),
      script: task.script.clone(),
      args: task.args.clone(),
      creator: task.creator.clone(),
      created_at,
      done: false,
    })
  }

  async fn get_task(&self, id: i64) -> Result<TaskMeta, StoreError> {
    let sql = format!("SELECT {} FROM task_meta WHERE id = ?", TASK_COLUMNS);
    sqlx::query_as::<_, TaskMeta>(&sql)
      .bind(id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or_else(|| StoreError::NotFound(format!("task {}", id)))
  }

  async fn count_tasks(&self, query: &TaskQuery) -> Result<i64, StoreError> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM task_meta");
    Self::push_filter(&mut builder, query);

    Ok(
      builder
        .build_query_scalar::<i64>()
        .fetch_one(&self.pool)
        .await?,
    )
  }

  async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskMeta>, StoreError> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM task_meta", TASK_COLUMNS));
    Self::push_filter(&mut builder, query);
    builder
      .push(" ORDER BY id DESC LIMIT ")
      .push_bind(i64::from(query.limit))
      .push(" OFFSET ")
      .push_bind(i64::from(query.offset));

    Ok(
      builder
        .build_query_as::<TaskMeta>()
        .fetch_all(&self.pool)
        .await?,
    )
  }

  async fn get_action(&self, id: i64) -> Result<Option<TaskAction>, StoreError> {
    Ok(
      sqlx::query_as::<_, TaskAction>("SELECT id, action, updated_at FROM task_action WHERE id = ?")
        .bind(id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn active_ids(&self, ids: &[i64]) -> Result<HashSet<i64>, StoreError> {
    if ids.is_empty() {
      return Ok(HashSet::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM task_action WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
      separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let found = builder.build_query_scalar::<i64>().fetch_all(&self.pool).await?;
    Ok(found.into_iter().collect())
  }

  async fn update_action(&self, id: i64, action: ActionKind) -> Result<bool, StoreError> {
    let mut tx = self.pool.begin().await?;

    let updated = sqlx::query("UPDATE task_action SET action = ?, updated_at = ? WHERE id = ?")
      .bind(action)
      .bind(Utc::now())
      .bind(id)
      .execute(&mut *tx)
      .await?
      .rows_affected();

    if updated == 0 {
      tx.rollback().await?;
      return Ok(false);
    }

    let cascade = match action {
      ActionKind::Cancel => Some((HostStatus::Pending, HostStatus::Cancelled)),
      ActionKind::Kill => Some((HostStatus::Running, HostStatus::Killed)),
      ActionKind::Start | ActionKind::Pause => None,
    };

    if let Some((from, to)) = cascade {
      let moved = sqlx::query("UPDATE task_host SET status = ? WHERE id = ? AND status = ?")
        .bind(to)
        .bind(id)
        .bind(from)
        .execute(&mut *tx)
        .await?
        .rows_affected();
      debug!(task_id = id, from = %from, to = %to, moved, "hosts moved by task action");
    }

    tx.commit().await?;
    Ok(true)
  }

  async fn list_hosts(&self, id: i64) -> Result<Vec<TaskHost>, StoreError> {
    Ok(
      sqlx::query_as::<_, TaskHost>(
        r#"
            SELECT id, host, status, stdout, stderr
            FROM task_host
            WHERE id = ?
            ORDER BY host ASC
            "#,
      )
      .bind(id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn get_host(&self, id: i64, host: &str) -> Result<Option<TaskHost>, StoreError> {
    Ok(
      sqlx::query_as::<_, TaskHost>(
        r#"
            SELECT id, host, status, stdout, stderr
            FROM task_host
            WHERE id = ? AND host = ?
            "#,
      )
      .bind(id)
      .bind(host)
      .fetch_optional(&self.pool)
      .await?,
    )
  }

  async fn set_host_status(
    &self,
    id: i64,
    host: &str,
    status: HostStatus,
  ) -> Result<bool, StoreError> {
    let updated = sqlx::query(
      r#"
            UPDATE task_host
            SET status = ?
            WHERE id = ? AND host = ?
              AND EXISTS (SELECT 1 FROM task_action WHERE task_action.id = ?)
            "#,
    )
    .bind(status)
    .bind(id)
    .bind(host)
    .bind(id)
    .execute(&self.pool)
    .await?
    .rows_affected();

    Ok(updated > 0)
  }

  async fn report_host(
    &self,
    id: i64,
    host: &str,
    status: HostStatus,
    stdout: &str,
    stderr: &str,
  ) -> Result<bool, StoreError> {
    let updated = sqlx::query(
      r#"
            UPDATE task_host
            SET status = ?, stdout = ?, stderr = ?
            WHERE id = ? AND host = ?
              AND EXISTS (SELECT 1 FROM task_action WHERE task_action.id = ?)
            "#,
    )
    .bind(status)
    .bind(stdout)
    .bind(stderr)
    .bind(id)
    .bind(host)
    .bind(id)
    .execute(&self.pool)
    .await?
    .rows_affected();

    Ok(updated > 0)
  }

  async fn finish_if_complete(&self, id: i64) -> Result<bool, StoreError> {
    let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM task_action WHERE id = ");
    builder
      .push_bind(id)
      .push(" AND NOT EXISTS (SELECT 1 FROM task_host WHERE task_host.id = ")
      .push_bind(id)
      .push(" AND status NOT IN (");
    let mut separated = builder.separated(", ");
    for status in HostStatus::TERMINAL {
      separated.push_bind(status);
    }
    separated.push_unseparated("))");

    let deleted = builder.build().execute(&self.pool).await?.rows_affected();
    if deleted > 0 {
      debug!(task_id = id, "task action cleared");
    }

    Ok(self.get_action(id).await?.is_none())
  }

  async fn create_template(&self, template: &TaskTemplate) -> Result<i64, StoreError> {
    let id = sqlx::query(
      r#"
            INSERT INTO task_tpl (title, account, batch, tolerance, timeout, pause, script, args, last_updator)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&template.title)
    .bind(&template.account)
    .bind(template.batch)
    .bind(template.tolerance)
    .bind(template.timeout)
    .bind(&template.pause)
    .bind(&template.script)
    .bind(&template.args)
    .bind(&template.last_updator)
    .execute(&self.pool)
    .await?
    .last_insert_rowid();

    Ok(id)
  }

  async fn get_template(&self, id: i64) -> Result<Option<TaskTemplate>, StoreError> {
    Ok(
      sqlx::query_as::<_, TaskTemplate>(
        r#"
            SELECT id, title, account, batch, tolerance, timeout, pause, script, args, last_updator
            FROM task_tpl
            WHERE id = ?
            "#,
      )
      .bind(id)
      .fetch_optional(&self.pool)
      .await?,
    )
  }
}
