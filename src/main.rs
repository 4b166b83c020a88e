use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use utilidesk::backend::{Params, ResponseEnvelope};
use utilidesk::config::Config;
use utilidesk::models::{AdminSetup, ComplaintFilter, NewComplaint, OutageFilter, UserFilter};
use utilidesk::sync::{BackgroundSync, CriticalQuery, CycleOutcome};
use utilidesk::ApiService;

#[derive(Parser, Debug)]
#[command(name = "utilidesk")]
#[command(about = "Command-line client for the utility complaint desk")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/utilidesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sign in and persist the session token
  Login {
    email: String,
    #[arg(long)]
    password: String,
  },
  /// Sign out and forget the session
  Logout,
  /// Show the signed-in user
  Whoami,
  /// List complaints
  Complaints {
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    priority: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    limit: Option<u64>,
  },
  /// File a new complaint
  FileComplaint {
    title: String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "general")]
    category: String,
    #[arg(long, default_value = "medium")]
    priority: String,
    #[arg(long)]
    customer: Option<String>,
    #[arg(long)]
    address: Option<String>,
  },
  /// Set a complaint's status
  SetStatus { id: String, status: String },
  /// Dashboard metrics
  Dashboard,
  /// List outages
  Outages {
    #[arg(long)]
    status: Option<String>,
  },
  /// List notifications
  Notifications,
  /// List users
  Users {
    #[arg(long)]
    role: Option<String>,
  },
  /// Check whether setup is needed, or create the first admin
  Setup {
    #[arg(long, requires_all = ["email", "password"])]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    password: Option<String>,
  },
  /// Keep critical data fresh and report each sync cycle until Ctrl-C
  Watch,
}

/// Log to a daily file under the data directory, plus stderr when verbose.
/// `RUST_LOG` controls the level (default `warn`).
fn init_tracing(verbose: bool) -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("utilidesk")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let (file_writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "utilidesk.log"));

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(file_writer).with_ansi(false))
    .with(verbose.then(|| fmt::layer().with_writer(io::stderr)))
    .with(filter)
    .init();

  Ok(guard)
}

fn print_envelope(envelope: &ResponseEnvelope) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(envelope)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing(args.verbose)?;

  let config = Config::load(args.config.as_deref())?;
  let service = ApiService::from_config(&config)?;
  info!(backend = service.backend_name(), "utilidesk starting");

  let restored = match args.command {
    Command::Login { .. } | Command::Logout => None,
    _ => match service.restore_session().await {
      Ok(restored) => restored,
      Err(e) => {
        warn!(error = %e, "Could not restore session");
        None
      }
    },
  };

  match args.command {
    Command::Login { email, password } => {
      let envelope = service.login(&email, &password).await?;
      print_envelope(&envelope)?;
    }
    Command::Logout => {
      let envelope = service.logout().await?;
      print_envelope(&envelope)?;
    }
    Command::Whoami => match restored {
      Some(envelope) => print_envelope(&envelope)?,
      None => println!("Not logged in"),
    },
    Command::Complaints {
      status,
      priority,
      search,
      limit,
    } => {
      let filter = ComplaintFilter {
        status,
        priority,
        search,
        limit,
        ..Default::default()
      };
      print_envelope(&service.get_complaints(&filter).await?)?;
    }
    Command::FileComplaint {
      title,
      description,
      category,
      priority,
      customer,
      address,
    } => {
      let complaint = NewComplaint {
        title,
        description,
        category,
        priority,
        customer_name: customer,
        address,
        ..Default::default()
      };
      print_envelope(&service.create_complaint(&complaint).await?)?;
    }
    Command::SetStatus { id, status } => {
      let mut updates = Params::new();
      updates.insert("status".into(), Value::String(status));
      print_envelope(&service.update_complaint(&id, updates).await?)?;
    }
    Command::Dashboard => print_envelope(&service.get_dashboard_data().await?)?,
    Command::Outages { status } => {
      let filter = OutageFilter {
        status,
        ..Default::default()
      };
      print_envelope(&service.get_outages(&filter).await?)?;
    }
    Command::Notifications => print_envelope(&service.get_notifications().await?)?,
    Command::Users { role } => {
      let filter = UserFilter {
        role,
        ..Default::default()
      };
      print_envelope(&service.get_users(&filter).await?)?;
    }
    Command::Setup {
      name: Some(name),
      email: Some(email),
      password: Some(password),
    } => {
      let admin = AdminSetup {
        name,
        email,
        password,
      };
      print_envelope(&service.setup_admin(&admin).await?)?;
    }
    Command::Setup { .. } => print_envelope(&service.check_users_exist().await?)?,
    Command::Watch => watch(&service).await?,
  }

  eprintln!("[{}]", service.status());
  Ok(())
}

async fn watch(service: &ApiService) -> Result<()> {
  let sync = BackgroundSync::new(service.clone(), CriticalQuery::defaults());

  // Refresh once up front instead of waiting a full interval.
  report(service, sync.on_foreground().await);
  let mut outcomes = sync.subscribe();
  sync.start();

  loop {
    tokio::select! {
      changed = outcomes.changed() => {
        if changed.is_err() {
          break;
        }
        let outcome = *outcomes.borrow_and_update();
        if let Some(outcome) = outcome {
          report(service, outcome);
        }
      }
      _ = tokio::signal::ctrl_c() => {
        println!("Stopping");
        break;
      }
    }
  }

  sync.stop().await;
  Ok(())
}

fn report(service: &ApiService, outcome: CycleOutcome) {
  let now = chrono::Local::now().format("%H:%M:%S");
  println!("{} [{}] {:?}", now, service.status(), outcome);
}
