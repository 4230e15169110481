use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use convoy_config::{OutputConfig, OutputSource};
use convoy_store::{Store, TaskHost};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::OutputError;

/// Which captured stream to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
  Stdout,
  Stderr,
}

impl Stream {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Stdout => "stdout",
      Self::Stderr => "stderr",
    }
  }

  fn select(&self, host: &TaskHost) -> String {
    match self {
      Self::Stdout => host.stdout.clone(),
      Self::Stderr => host.stderr.clone(),
    }
  }
}

impl fmt::Display for Stream {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Output of one host in a whole-task listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
  pub host: String,
  pub output: String,
}

/// Output of a single host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOutput {
  /// Text read from the persisted row.
  Text(String),
  /// JSON body returned by the executing host, untouched.
  Raw(String),
}

/// Resolves captured output for task hosts.
pub struct OutputRetriever {
  store: Arc<dyn Store>,
  config: OutputConfig,
  client: Client,
}

impl OutputRetriever {
  pub fn new(store: Arc<dyn Store>, config: OutputConfig) -> Result<Self, OutputError> {
    let client = Client::builder()
      .timeout(Duration::from_millis(config.remote_timeout_ms))
      .build()
      .map_err(OutputError::Client)?;

    Ok(Self {
      store,
      config,
      client,
    })
  }

  pub fn config(&self) -> &OutputConfig {
    &self.config
  }

  /// Output of one host, from the configured source.
  pub async fn host_output(
    &self,
    task_id: i64,
    host: &str,
    stream: Stream,
  ) -> Result<HostOutput, OutputError> {
    let row = self
      .store
      .get_host(task_id, host)
      .await?
      .ok_or_else(|| OutputError::NotFound {
        task_id,
        host: host.to_string(),
      })?;

    match self.config.source {
      OutputSource::Database => Ok(HostOutput::Text(stream.select(&row))),
      OutputSource::Remote => self.fetch_remote(task_id, host, stream).await,
    }
  }

  async fn fetch_remote(
    &self,
    task_id: i64,
    host: &str,
    stream: Stream,
  ) -> Result<HostOutput, OutputError> {
    let port = self.config.port()?;
    let url = format!(
      "http://{}:{}/output/{}/{}.json",
      host, port, task_id, stream
    );

    debug!(task_id, host = %host, url = %url, "fetching remote output");

    let unavailable = |source: reqwest::Error| {
      warn!(task_id, host = %host, error = %source, "remote output unavailable");
      OutputError::UpstreamUnavailable {
        url: url.clone(),
        source,
      }
    };

    let response = self.client.get(&url).send().await.map_err(unavailable)?;
    let body = response.text().await.map_err(unavailable)?;

    Ok(HostOutput::Raw(body))
  }

  /// Persisted output per host in host order, or only `host` when given.
  pub async fn entries(
    &self,
    task_id: i64,
    host: Option<&str>,
    stream: Stream,
  ) -> Result<Vec<OutputEntry>, OutputError> {
    let rows = match host {
      Some(host) => {
        let row = self
          .store
          .get_host(task_id, host)
          .await?
          .ok_or_else(|| OutputError::NotFound {
            task_id,
            host: host.to_string(),
          })?;
        vec![row]
      }
      None => self.store.list_hosts(task_id).await?,
    };

    Ok(
      rows
        .iter()
        .map(|row| OutputEntry {
          host: row.host.clone(),
          output: stream.select(row),
        })
        .collect(),
    )
  }

  /// Persisted output of every host as one text document.
  pub async fn plain_text(&self, task_id: i64, stream: Stream) -> Result<String, OutputError> {
    let entries = self.entries(task_id, None, stream).await?;
    Ok(render_plain_text(&entries))
  }
}

/// Render entries as `"<host>:\n<output>"` blocks separated by a blank line.
pub fn render_plain_text(entries: &[OutputEntry]) -> String {
  let mut text = String::new();
  for (i, entry) in entries.iter().enumerate() {
    if i != 0 {
      text.push_str("\n\n");
    }
    text.push_str(&entry.host);
    text.push_str(":\n");
    text.push_str(&entry.output);
  }
  text
}

#[cfg(test)]
mod tests {
  use super::*;
  use convoy_store::{ActionKind, HostStatus, NewTask, SqliteStore};
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn store_with_task(hosts: &[&str]) -> (Arc<SqliteStore>, i64) {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let hosts: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();
    let task = NewTask {
      title: "uptime".to_string(),
      account: "root".to_string(),
      script: "uptime".to_string(),
      creator: "alice".to_string(),
      ..Default::default()
    };
    let meta = store
      .create_task(&task, &hosts, ActionKind::Start)
      .await
      .unwrap();
    (store, meta.id)
  }

  fn remote(port: u32) -> OutputConfig {
    OutputConfig {
      source: OutputSource::Remote,
      remote_port: port,
      remote_timeout_ms: 2_000,
    }
  }

  #[test]
  fn test_render_plain_text() {
    let entries = vec![
      OutputEntry {
        host: "h1".to_string(),
        output: "up 3 days".to_string(),
      },
      OutputEntry {
        host: "h2".to_string(),
        output: "up 5 days".to_string(),
      },
    ];
    assert_eq!(
      render_plain_text(&entries),
      "h1:\nup 3 days\n\nh2:\nup 5 days"
    );
    assert_eq!(render_plain_text(&[]), "");
  }

  #[tokio::test]
  async fn test_database_mode_reads_rows() {
    let (store, id) = store_with_task(&["h2", "h1"]).await;
    store
      .report_host(id, "h1", HostStatus::Success, "one", "")
      .await
      .unwrap();
    store
      .report_host(id, "h2", HostStatus::Failed, "two", "bad")
      .await
      .unwrap();

    let retriever = OutputRetriever::new(store, OutputConfig::default()).unwrap();

    let out = retriever.host_output(id, "h2", Stream::Stderr).await.unwrap();
    assert_eq!(out, HostOutput::Text("bad".to_string()));

    let entries = retriever.entries(id, None, Stream::Stdout).await.unwrap();
    let hosts: Vec<_> = entries.iter().map(|e| e.host.as_str()).collect();
    assert_eq!(hosts, vec!["h1", "h2"]);

    let single = retriever.entries(id, Some("h1"), Stream::Stdout).await.unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].output, "one");

    let text = retriever.plain_text(id, Stream::Stdout).await.unwrap();
    assert_eq!(text, "h1:\none\n\nh2:\ntwo");
  }

  #[tokio::test]
  async fn test_unknown_host_not_found() {
    let (store, id) = store_with_task(&["h1"]).await;
    let retriever = OutputRetriever::new(store, OutputConfig::default()).unwrap();

    let err = retriever
      .host_output(id, "h9", Stream::Stdout)
      .await
      .unwrap_err();
    assert!(matches!(err, OutputError::NotFound { .. }));

    let err = retriever
      .entries(id, Some("h9"), Stream::Stdout)
      .await
      .unwrap_err();
    assert!(matches!(err, OutputError::NotFound { .. }));
  }

  #[tokio::test]
  async fn test_remote_mode_passes_body_through() {
    let server = MockServer::start().await;
    let (store, id) = store_with_task(&["127.0.0.1"]).await;

    let body = r#"{"dat":"remote stdout","err":""}"#;
    Mock::given(method("GET"))
      .and(path(format!("/output/{}/stdout.json", id)))
      .respond_with(ResponseTemplate::new(200).set_body_string(body))
      .mount(&server)
      .await;

    let port = u32::from(server.address().port());
    let retriever = OutputRetriever::new(store, remote(port)).unwrap();

    let out = retriever
      .host_output(id, "127.0.0.1", Stream::Stdout)
      .await
      .unwrap();
    assert_eq!(out, HostOutput::Raw(body.to_string()));
  }

  #[tokio::test]
  async fn test_remote_mode_invalid_port() {
    let (store, id) = store_with_task(&["h1"]).await;

    for port in [0, 70_000] {
      let retriever = OutputRetriever::new(store.clone(), remote(port)).unwrap();
      let err = retriever
        .host_output(id, "h1", Stream::Stdout)
        .await
        .unwrap_err();
      assert!(matches!(err, OutputError::ConfigInvalid(_)));
    }
  }

  #[tokio::test]
  async fn test_remote_mode_unreachable_host() {
    let (store, id) = store_with_task(&["127.0.0.1"]).await;

    let port = {
      let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
      listener.local_addr().unwrap().port()
    };

    let retriever = OutputRetriever::new(store, remote(u32::from(port))).unwrap();
    let err = retriever
      .host_output(id, "127.0.0.1", Stream::Stderr)
      .await
      .unwrap_err();

    match err {
      OutputError::UpstreamUnavailable { url, .. } => {
        assert_eq!(url, format!("http://127.0.0.1:{}/output/{}/stderr.json", port, id));
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }
}
