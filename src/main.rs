use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use convoy_auth::{Directory, Principal, StaticDirectory};
use convoy_config::ServiceConfig;
use convoy_lifecycle::{
  AlertEvent, AlertTarget, HostCommand, HostReport, ListFilter, NoopAgent, TaskForm,
  TaskLifecycleService,
};
use convoy_output::{HostOutput, OutputEntry, Stream};
use convoy_store::{ActionKind, HostStatus, SqliteStore, Store, TaskTemplate};

/// Convoy - run scripts across fleets of hosts as tracked tasks
#[derive(Parser)]
#[command(name = "convoy")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.convoy)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to the configuration file (default: <data-dir>/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// User the command runs as
  #[arg(long, global = true)]
  user: Option<String>,

  /// Log filter, e.g. `info` or `convoy_store=debug`
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Create and control tasks
  Task {
    #[command(subcommand)]
    command: TaskCommand,
  },

  /// Manage task templates
  Template {
    #[command(subcommand)]
    command: TemplateCommand,
  },

  /// Handle a monitoring event read from a file or stdin
  Callback {
    /// Path to the event JSON (default: stdin)
    event_file: Option<PathBuf>,

    /// Host to run on instead of the event endpoint
    #[arg(long)]
    host: Option<String>,

    /// Template to run
    #[arg(long)]
    tpl_id: i64,
  },
}

#[derive(Subcommand)]
enum TaskCommand {
  /// Create a task from a JSON form read from a file or stdin
  Create {
    /// Path to the task form (default: stdin)
    form_file: Option<PathBuf>,
  },

  /// List recent tasks
  List {
    /// Whitespace-separated title keywords
    #[arg(long)]
    query: Option<String>,

    /// Only tasks created by --user
    #[arg(long)]
    mine: bool,

    /// Lookback window in days
    #[arg(long)]
    days: Option<u32>,

    #[arg(long)]
    limit: Option<u32>,

    #[arg(long)]
    offset: Option<u32>,
  },

  /// Show a task with its hosts
  View { id: i64 },

  /// Set the task action: start, pause, cancel or kill
  Action { id: i64, action: String },

  /// Run a host command: ignore, kill or redo
  Host {
    id: i64,
    host: String,
    command: String,
  },

  /// Print `done` or the current action
  State { id: i64 },

  /// Hosts grouped by status
  Result { id: i64 },

  /// Show one host row
  Record { id: i64, host: String },

  /// Print captured stdout
  Stdout {
    id: i64,

    #[command(flatten)]
    output: OutputArgs,
  },

  /// Print captured stderr
  Stderr {
    id: i64,

    #[command(flatten)]
    output: OutputArgs,
  },

  /// Record host progress on behalf of the execution agent
  Report {
    id: i64,
    host: String,
    status: String,

    #[arg(long, default_value = "")]
    stdout: String,

    #[arg(long, default_value = "")]
    stderr: String,
  },
}

#[derive(clap::Args)]
struct OutputArgs {
  /// Only this host
  #[arg(long)]
  host: Option<String>,

  /// Render every host as plain text
  #[arg(long, conflicts_with = "host")]
  text: bool,
}

#[derive(Subcommand)]
enum TemplateCommand {
  /// Add a template from a JSON file or stdin
  Add {
    /// Path to the template (default: stdin)
    template_file: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  init_tracing(&cli.log_level)?;

  let data_dir = match cli.data_dir.clone() {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".convoy"),
  };

  let Some(command) = cli.command else {
    println!("convoy - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    let app = App::open(&data_dir, cli.config.as_deref(), cli.user).await?;
    app.run(command).await
  })
}

fn init_tracing(log_level: &str) -> Result<()> {
  let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .try_init()
    .map_err(|err| anyhow!(err))
    .context("failed to initialize tracing")
}

struct App {
  service: TaskLifecycleService<NoopAgent>,
  store: Arc<dyn Store>,
  directory: Arc<dyn Directory>,
  user: Option<String>,
}

impl App {
  async fn open(data_dir: &Path, config: Option<&Path>, user: Option<String>) -> Result<Self> {
    std::fs::create_dir_all(data_dir)
      .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config_path = config
      .map(Path::to_path_buf)
      .unwrap_or_else(|| data_dir.join("config.json"));
    let config = ServiceConfig::load(&config_path)
      .with_context(|| format!("failed to load config: {}", config_path.display()))?;

    let database_url = config
      .database_url
      .clone()
      .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("convoy.db").display()));
    let store: Arc<dyn Store> = Arc::new(
      SqliteStore::connect(&database_url)
        .await
        .with_context(|| format!("failed to open database: {}", database_url))?,
    );

    let directory_path = data_dir.join("directory.json");
    let directory: Arc<dyn Directory> = if directory_path.exists() {
      Arc::new(
        StaticDirectory::load(&directory_path)
          .with_context(|| format!("failed to load directory: {}", directory_path.display()))?,
      )
    } else {
      warn!(path = %directory_path.display(), "no directory file, every host is unknown");
      Arc::new(StaticDirectory::new())
    };

    let service = TaskLifecycleService::from_config(
      &config,
      Arc::clone(&store),
      Arc::clone(&directory),
      NoopAgent,
    )
    .context("invalid configuration")?;

    info!(database = %database_url, "convoy ready");

    Ok(Self {
      service,
      store,
      directory,
      user,
    })
  }

  async fn principal(&self) -> Result<Principal> {
    let username = self
      .user
      .as_deref()
      .context("--user is required for this command")?;
    self
      .directory
      .find_user(username)
      .await?
      .with_context(|| format!("user {} not found", username))
  }

  async fn run(&self, command: Commands) -> Result<()> {
    match command {
      Commands::Task { command } => self.run_task(command).await,
      Commands::Template {
        command: TemplateCommand::Add { template_file },
      } => {
        let template: TaskTemplate = read_json(template_file.as_deref())?;
        if template.title.trim().is_empty() || template.script.trim().is_empty() {
          bail!("template title and script are required");
        }
        let id = self.store.create_template(&template).await?;
        print_json(&serde_json::json!({ "id": id }))
      }
      Commands::Callback {
        event_file,
        host,
        tpl_id,
      } => {
        let event: AlertEvent = read_json(event_file.as_deref())?;
        let target = AlertTarget {
          host,
          template_id: tpl_id,
        };
        let outcome = self.service.handle_alert(&event, &target).await?;
        print_json(&outcome)
      }
    }
  }

  async fn run_task(&self, command: TaskCommand) -> Result<()> {
    match command {
      TaskCommand::Create { form_file } => {
        let form: TaskForm = read_json(form_file.as_deref())?;
        let meta = self.service.create(&form, &self.principal().await?).await?;
        print_json(&meta)
      }
      TaskCommand::List {
        query,
        mine,
        days,
        limit,
        offset,
      } => {
        let principal = match (mine, self.user.as_deref()) {
          (true, _) => self.principal().await?,
          (false, Some(user)) => Principal::new(user),
          (false, None) => Principal::new(""),
        };
        let filter = ListFilter {
          query,
          mine,
          days,
          limit,
          offset,
        };
        print_json(&self.service.list(&principal, &filter).await?)
      }
      TaskCommand::View { id } => print_json(&self.service.view(id).await?),
      TaskCommand::Action { id, action } => {
        let action: ActionKind = action.parse()?;
        self
          .service
          .set_action(id, &self.principal().await?, action)
          .await?;
        print_json(&serde_json::json!({ "id": id, "action": action }))
      }
      TaskCommand::Host { id, host, command } => {
        let command: HostCommand = command.parse()?;
        let outcome = self
          .service
          .host_command(id, &self.principal().await?, &host, command)
          .await?;
        print_json(&outcome)
      }
      TaskCommand::State { id } => {
        println!("{}", self.service.current_state(id).await?);
        Ok(())
      }
      TaskCommand::Result { id } => print_json(&self.service.aggregate_status(id).await?),
      TaskCommand::Record { id, host } => print_json(&self.service.host_record(id, &host).await?),
      TaskCommand::Stdout { id, output } => self.print_output(id, output, Stream::Stdout).await,
      TaskCommand::Stderr { id, output } => self.print_output(id, output, Stream::Stderr).await,
      TaskCommand::Report {
        id,
        host,
        status,
        stdout,
        stderr,
      } => {
        let status: HostStatus = status.parse()?;
        let report = HostReport {
          task_id: id,
          host,
          status,
          stdout,
          stderr,
        };
        let done = self.service.report_host(&report).await?;
        print_json(&serde_json::json!({ "id": id, "done": done }))
      }
    }
  }

  async fn print_output(&self, id: i64, args: OutputArgs, stream: Stream) -> Result<()> {
    if args.text {
      print!("{}", self.service.output_text(id, stream).await?);
      return Ok(());
    }

    match args.host {
      Some(host) => match self.service.host_output(id, &host, stream).await? {
        HostOutput::Text(output) => print_json(&OutputEntry { host, output }),
        HostOutput::Raw(body) => {
          println!("{}", body);
          Ok(())
        }
      },
      None => print_json(&self.service.output_entries(id, None, stream).await?),
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Read a JSON document from `path`, or from stdin when no path is given.
fn read_json<T: DeserializeOwned>(path: Option<&Path>) -> Result<T> {
  let content = match path {
    Some(path) => std::fs::read_to_string(path)
      .with_context(|| format!("failed to read file: {}", path.display()))?,
    None => {
      let mut input = String::new();
      io::stdin()
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
      input
    }
  };

  serde_json::from_str(&content).context("failed to parse JSON")
}
