mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use convene_api::{AppState, AppStateInner};
use convene_db::Database;
use convene_notify::{ConsoleMailer, Mailer, Notifier, SmtpMailer, reminders, worker};
use convene_types::jobs::EmailJob;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convene=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);

    // Email worker and reminder sweep share one transport.
    let (notifier, jobs) = Notifier::new();
    match &config.smtp {
        Some(settings) => {
            let mailer = SmtpMailer::new(settings, &config.mail_from)?;
            info!("Sending email via SMTP relay {}:{}", settings.host, settings.port);
            spawn_mail_tasks(db.clone(), Arc::new(mailer), jobs, config.reminder_interval_secs);
        }
        None => {
            info!("CONVENE_SMTP_HOST not set, emails will be logged instead of sent");
            spawn_mail_tasks(db.clone(), Arc::new(ConsoleMailer::new()), jobs, config.reminder_interval_secs);
        }
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret,
        notifier,
    });

    let app = convene_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Convene server listening on {}", addr);
    info!("Reminder sweep every {} seconds", config.reminder_interval_secs);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn spawn_mail_tasks<M: Mailer>(
    db: Arc<Database>,
    mailer: Arc<M>,
    jobs: UnboundedReceiver<EmailJob>,
    reminder_interval_secs: u64,
) {
    tokio::spawn(worker::run_worker(db.clone(), mailer.clone(), jobs));
    tokio::spawn(reminders::run_reminder_loop(db, mailer, reminder_interval_secs));
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
