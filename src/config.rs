use crate::document::DEFAULT_RETRY_BUDGET;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_DATABASE_URL: &str = "sqlite://fundval.db";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_EDINET_BASE_URL: &str = "https://disclosure.edinet-fsa.go.jp/";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration, read from the environment (a `.env` file is loaded
/// by the binary before this runs).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub edinet_base_url: Url,
    pub user_agent: String,
    pub retry_budget: u8,
    pub workers: usize,
    pub fetch_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("FUNDVAL_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let data_dir = PathBuf::from(
            env::var("FUNDVAL_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()),
        );
        let edinet_base_url = Url::parse(
            &env::var("FUNDVAL_EDINET_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_EDINET_BASE_URL.to_string()),
        )
        .context("FUNDVAL_EDINET_BASE_URL is not a valid URL")?;
        let user_agent = env::var("FUNDVAL_USER_AGENT")
            .unwrap_or_else(|_| format!("fundval/{}", env!("CARGO_PKG_VERSION")));

        let retry_budget = parsed_var("FUNDVAL_RETRY_BUDGET", DEFAULT_RETRY_BUDGET)?;
        // Below 3 there is no failed zone between "pending" and "exhausted".
        if retry_budget < 3 {
            return Err(anyhow!(
                "FUNDVAL_RETRY_BUDGET must be at least 3, got {}",
                retry_budget
            ));
        }

        let workers = parsed_var("FUNDVAL_WORKERS", DEFAULT_WORKERS)?.max(1);
        let fetch_timeout = Duration::from_secs(parsed_var(
            "FUNDVAL_FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT_SECS,
        )?);

        Ok(Self {
            database_url,
            data_dir,
            edinet_base_url,
            user_agent,
            retry_budget,
            workers,
            fetch_timeout,
        })
    }
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{} has an unparseable value: {}", name, raw)),
        Err(_) => Ok(default),
    }
}
