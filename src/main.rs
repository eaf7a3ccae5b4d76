//! es-console entry point.
//!
//! Connects to the event-streaming server, subscribes to the subjects
//! given on the command line and prints every update as a JSON line.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use eventstreams_comm::auth::Credentials;
use eventstreams_comm::{BindingSink, Client, ClientConfig, SessionEvent, Subject, Update};

/// Terminal consumer of the eventstreams messaging core.
#[derive(Debug, Parser)]
#[command(name = "es-console", version, about)]
struct Args {
    /// Subjects as `address/route/topic`; `local` is the attached node.
    #[arg(required = true)]
    subjects: Vec<String>,

    /// WebSocket endpoint, overriding `ES_ENDPOINT`.
    #[arg(long)]
    endpoint: Option<String>,

    /// User name for credential login when no token is stored.
    #[arg(long, requires = "password")]
    user: Option<String>,

    /// Password; hashed before it leaves the process.
    #[arg(long, requires = "user")]
    password: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

/// Writes updates to stdout, one JSON object per line.
#[derive(Debug)]
struct JsonLines;

impl BindingSink for JsonLines {
    fn on_data(&self, subject: &Subject, update: &Update) {
        let line = serde_json::json!({
            "subject": subject.to_string(),
            "type": update.tag.to_string(),
            "payload": update.payload,
        });
        println!("{line}");
    }

    fn on_stale_changed(&self, subject: &Subject, stale: bool) {
        tracing::info!(%subject, stale, "stale flag changed");
    }

    fn on_connectivity_changed(&self, connected: bool) {
        tracing::info!(connected, "connectivity changed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let mut config = ClientConfig::from_env()?;
    if let Some(endpoint) = args.endpoint {
        config = config.with_endpoint(endpoint)?;
    }

    let subjects = args
        .subjects
        .iter()
        .map(|s| s.parse::<Subject>())
        .collect::<Result<Vec<_>, _>>()?;
    let credentials = match (args.user, args.password) {
        (Some(user), Some(password)) => Some(Credentials::from_password(user, &password)),
        _ => None,
    };

    let client = Client::from_config(config);
    let mut events = client.events();
    let mut permissions = client.watch_permissions();
    let binding = client.bind(Arc::new(JsonLines));
    binding.reconcile(&subjects);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                res?;
                tracing::info!("interrupted, shutting down");
                break;
            }
            changed = permissions.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = Arc::clone(&permissions.borrow_and_update());
                tracing::info!(
                    domains = ?current.domains(),
                    rules = current.rule_count(),
                    "permissions updated"
                );
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let json = serde_json::to_string(&event).unwrap_or_default();
                        tracing::info!(event = %json, "session event");
                        if matches!(event, SessionEvent::LoginRequired { .. })
                            && let Some(credentials) = &credentials
                        {
                            client.login(credentials.clone())?;
                        }
                        if matches!(event, SessionEvent::AccessDenied { .. })
                            && credentials.is_some()
                        {
                            tracing::error!("access denied for the given credentials");
                        }
                    }
                    Err(RecvError::Lagged(n)) => tracing::warn!(lagged = n, "event stream lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    binding.stop();
    client.shutdown().await?;
    Ok(())
}
