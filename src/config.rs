use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Telegram
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub telegram_webhook_secret: Option<String>,
    pub admin_user_ids: HashSet<i64>,

    // Gemini (document analysis)
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_api_url: String,
    pub gemini_timeout_seconds: u64,

    // Perplexity (market prices)
    pub perplexity_api_key: Option<String>,
    pub perplexity_model: String,
    pub perplexity_api_url: String,
    pub perplexity_timeout_seconds: u64,
    pub enrich_max_concurrent: usize,

    // Google Sheets
    pub google_credentials_path: PathBuf,
    pub google_sheets_api_url: String,
    pub sheets_retry_max_elapsed_seconds: u64,

    // Local storage
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub excel_dir: PathBuf,
    pub json_dir: PathBuf,
    pub max_file_size_bytes: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Telegram
        let telegram_bot_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let telegram_api_url = env::var("TELEGRAM_API_URL")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string());
        let telegram_webhook_secret = optional("TELEGRAM_WEBHOOK_SECRET");
        let admin_user_ids = parse_admin_ids(&env::var("ADMIN_USER_IDS").unwrap_or_default())
            .context("ADMIN_USER_IDS must be a comma separated list or JSON array of ids")?;

        // Gemini
        let gemini_api_key = optional("GEMINI_API_KEY");
        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
        let gemini_api_url = env::var("GEMINI_API_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
        let gemini_timeout_seconds = parsed("GEMINI_TIMEOUT_SECONDS", 60);

        // Perplexity
        let perplexity_api_key = optional("PERPLEXITY_API_KEY");
        let perplexity_model =
            env::var("PERPLEXITY_MODEL").unwrap_or_else(|_| "sonar".to_string());
        let perplexity_api_url = env::var("PERPLEXITY_API_URL")
            .unwrap_or_else(|_| "https://api.perplexity.ai".to_string());
        let perplexity_timeout_seconds = parsed("PERPLEXITY_TIMEOUT_SECONDS", 30);
        let enrich_max_concurrent = parsed(
            "ENRICH_MAX_CONCURRENT",
            crate::services::enrichment::DEFAULT_MAX_CONCURRENT,
        );
        if enrich_max_concurrent == 0 {
            bail!("ENRICH_MAX_CONCURRENT must be at least 1");
        }

        // Google Sheets
        let google_credentials_path = PathBuf::from(
            env::var("GOOGLE_CREDENTIALS_PATH").unwrap_or_else(|_| "credentials.json".to_string()),
        );
        let google_sheets_api_url = env::var("GOOGLE_SHEETS_API_URL")
            .unwrap_or_else(|_| "https://sheets.googleapis.com".to_string());
        let sheets_retry_max_elapsed_seconds = parsed("SHEETS_RETRY_MAX_ELAPSED_SECONDS", 20);

        // Local storage
        let dir = |name: &str, default: &str| {
            PathBuf::from(env::var(name).unwrap_or_else(|_| default.to_string()))
        };
        let data_dir = dir("DATA_DIR", "data");
        let temp_dir = dir("TEMP_DIR", "temp");
        let excel_dir = dir("EXCEL_DIR", "excel_data");
        let json_dir = dir("JSON_DIR", "json_data");
        let max_file_size_bytes = parsed("MAX_FILE_SIZE_BYTES", 50 * 1024 * 1024);

        Ok(Settings {
            env,
            server_addr,
            telegram_bot_token,
            telegram_api_url,
            telegram_webhook_secret,
            admin_user_ids,
            gemini_api_key,
            gemini_model,
            gemini_api_url,
            gemini_timeout_seconds,
            perplexity_api_key,
            perplexity_model,
            perplexity_api_url,
            perplexity_timeout_seconds,
            enrich_max_concurrent,
            google_credentials_path,
            google_sheets_api_url,
            sheets_retry_max_elapsed_seconds,
            data_dir,
            temp_dir,
            excel_dir,
            json_dir,
            max_file_size_bytes,
        })
    }

    pub fn project_mapping_path(&self) -> PathBuf {
        self.data_dir.join("pointname_sheetsid.json")
    }

    pub fn user_mapping_path(&self) -> PathBuf {
        self.data_dir.join("user_map.json")
    }

    /// Defaults with every optional service disabled, rooted at `dir`.
    #[cfg(test)]
    pub fn for_tests(dir: &std::path::Path) -> Self {
        Settings {
            env: Environment::Dev,
            server_addr: "127.0.0.1:0".to_string(),
            telegram_bot_token: "TOKEN".to_string(),
            telegram_api_url: "http://127.0.0.1:1".to_string(),
            telegram_webhook_secret: None,
            admin_user_ids: HashSet::new(),
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_api_url: "http://127.0.0.1:1".to_string(),
            gemini_timeout_seconds: 5,
            perplexity_api_key: None,
            perplexity_model: "sonar".to_string(),
            perplexity_api_url: "http://127.0.0.1:1".to_string(),
            perplexity_timeout_seconds: 5,
            enrich_max_concurrent: 2,
            google_credentials_path: dir.join("missing-credentials.json"),
            google_sheets_api_url: "http://127.0.0.1:1".to_string(),
            sheets_retry_max_elapsed_seconds: 1,
            data_dir: dir.join("data"),
            temp_dir: dir.join("temp"),
            excel_dir: dir.join("excel"),
            json_dir: dir.join("json"),
            max_file_size_bytes: 1024 * 1024,
        }
    }
}

/// Set and non-blank, otherwise `None`.
fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Accepts `1,2,3` as well as `[1, 2, 3]`.
pub fn parse_admin_ids(raw: &str) -> Result<HashSet<i64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(HashSet::new());
    }
    if raw.starts_with('[') {
        let ids: Vec<i64> = serde_json::from_str(raw).context("invalid JSON array")?;
        return Ok(ids.into_iter().collect());
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().with_context(|| format!("invalid id `{s}`")))
        .collect()
}
