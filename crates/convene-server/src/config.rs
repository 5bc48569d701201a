use std::path::PathBuf;

use anyhow::{Context, bail};

use convene_notify::SmtpSettings;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_MAIL_FROM: &str = "noreply@convene.local";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub reminder_interval_secs: u64,
    pub mail_from: String,
    /// `None` selects the console mailer.
    pub smtp: Option<SmtpSettings>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("CONVENE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CONVENE_JWT_SECRET is unset or still a placeholder. Set it in your .env file and restart.");
        }

        let port: u16 = var("CONVENE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("CONVENE_PORT must be a port number")?;

        let reminder_interval_secs: u64 = var("CONVENE_REMINDER_INTERVAL_SECS")
            .unwrap_or_else(|| "3600".into())
            .parse()
            .context("CONVENE_REMINDER_INTERVAL_SECS must be a whole number of seconds")?;
        if reminder_interval_secs == 0 {
            bail!("CONVENE_REMINDER_INTERVAL_SECS must be greater than zero");
        }

        let smtp = match var("CONVENE_SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: var("CONVENE_SMTP_PORT")
                    .unwrap_or_else(|| "587".into())
                    .parse()
                    .context("CONVENE_SMTP_PORT must be a port number")?,
                username: var("CONVENE_SMTP_USERNAME"),
                password: var("CONVENE_SMTP_PASSWORD"),
            }),
            None => None,
        };

        Ok(Self {
            host: var("CONVENE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("CONVENE_DB_PATH").unwrap_or_else(|| "convene.db".into()).into(),
            jwt_secret,
            reminder_interval_secs,
            mail_from: var("CONVENE_MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.into()),
            smtp,
        })
    }
}
