use std::{env::var, path::PathBuf, time::Duration};

use mongodb::{Client, Database};
use sentry::types::Dsn;
use tracing::{error, warn};

use crate::{convert::Converter, s3::Storage};

#[derive(Clone, Debug)]
pub struct AppState {
    pub client: Client,
    pub legacy_client: Client,
    pub storage: Storage,
    pub converter: Converter,
    pub env_vars: EnvVars,
}

impl AppState {
    /// Database holding the generated `questions`, `worksheets` and `mindmaps`
    pub fn ai_db(&self) -> Database {
        schema::db::database(&self.client, &self.env_vars.db_name)
    }

    pub fn legacy_db(&self) -> Database {
        schema::db::database(&self.legacy_client, &self.env_vars.legacy_db_name)
    }
}

#[derive(Clone, Debug)]
pub struct EnvVars {
    pub conversion_retries: u32,
    pub conversion_timeout: Duration,
    pub db_name: String,
    pub environment: Environment,
    pub legacy_db_name: String,
    pub legacy_mongodb_uri: String,
    pub libreoffice_paths: Vec<String>,
    pub mongodb_uri: String,
    pub port: u16,
    pub request_body_size_limit: usize,
    pub request_timeout_in_ms: u64,
    pub s3_access_key_id: String,
    pub s3_bucket_name: String,
    pub s3_endpoint: String,
    pub s3_public_url: Option<String>,
    pub s3_region: String,
    pub s3_secret_access_key: String,
    pub sentry_dsn: Option<String>,
    pub unoconv_path: String,
    pub work_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" => Environment::Development,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            other => {
                warn!(
                    "ENVIRONMENT value '{}' is not valid. Defaulting to 'production'.",
                    other
                );
                Environment::Production
            }
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        };
        f.write_str(name)
    }
}

pub const DEFAULT_LIBREOFFICE_PATHS: [&str; 4] = [
    "libreoffice",
    "soffice",
    "/usr/bin/libreoffice",
    "/usr/bin/soffice",
];

impl EnvVars {
    pub fn new() -> Self {
        let Ok(mongodb_uri) = var("MONGODB_URI") else {
            error!("MONGODB_URI not set");
            panic!("MONGODB_URI required");
        };
        assert!(!mongodb_uri.is_empty(), "MONGODB_URI must not be empty");

        let db_name = non_empty_or("DB_NAME", "ai");

        let legacy_mongodb_uri = match var("LEGACY_MONGODB_URI") {
            Ok(s) if !s.is_empty() => s,
            _ => {
                warn!("LEGACY_MONGODB_URI not set. Defaulting to MONGODB_URI");
                mongodb_uri.clone()
            }
        };
        let legacy_db_name = non_empty_or("LEGACY_DB_NAME", "ien");

        let Ok(s3_endpoint) = var("S3_ENDPOINT") else {
            error!("S3_ENDPOINT not set");
            panic!("S3_ENDPOINT required");
        };
        assert!(!s3_endpoint.is_empty(), "S3_ENDPOINT must not be empty");
        let s3_bucket_name = non_empty_or("S3_BUCKET_NAME", "worksheets");
        let Ok(s3_access_key_id) = var("S3_ACCESS_KEY_ID") else {
            error!("S3_ACCESS_KEY_ID not set");
            panic!("S3_ACCESS_KEY_ID required");
        };
        let Ok(s3_secret_access_key) = var("S3_SECRET_ACCESS_KEY") else {
            error!("S3_SECRET_ACCESS_KEY not set");
            panic!("S3_SECRET_ACCESS_KEY required");
        };
        let s3_region = non_empty_or("S3_REGION", "auto");
        let s3_public_url = match var("S3_PUBLIC_URL") {
            Ok(s) if !s.is_empty() => Some(s),
            _ => {
                warn!("S3_PUBLIC_URL not set. Public links will use the S3 endpoint");
                None
            }
        };

        let sentry_dsn = match var("SENTRY_DSN") {
            Ok(dsn_string) => {
                assert!(
                    valid_sentry_dsn(&dsn_string),
                    "SENTRY_DSN is not valid DSN."
                );
                Some(dsn_string)
            }
            Err(_e) => {
                warn!("SENTRY_DSN not set.");
                None
            }
        };

        let environment = match var("ENVIRONMENT") {
            Ok(v) => v.into(),
            Err(_e) => {
                warn!("ENVIRONMENT not set. Defaulting to 'production'.");
                Environment::Production
            }
        };

        let port = match var("PORT") {
            Ok(port_string) => port_string.parse().expect("PORT to be parseable as u16"),
            Err(_e) => {
                let default_port = 8000;
                warn!("PORT not set. Defaulting to {default_port}");
                default_port
            }
        };

        // Generating both variants and converting them to PDF takes a while
        let request_timeout_in_ms = match var("REQUEST_TIMEOUT_IN_MS") {
            Ok(s) => s
                .parse()
                .expect("REQUEST_TIMEOUT_IN_MS to be valid unsigned integer"),
            Err(_e) => {
                let default_request_timeout = 300_000;
                warn!("REQUEST_TIMEOUT_IN_MS not set. Defaulting to {default_request_timeout}");
                default_request_timeout
            }
        };

        let request_body_size_limit = match var("REQUEST_BODY_SIZE_LIMIT") {
            Ok(s) => s
                .parse()
                .expect("REQUEST_BODY_SIZE_LIMIT to be valid unsigned integer"),
            Err(_e) => {
                let base: usize = 2;
                let exp = 20;
                let default_request_body_size_limit = 5 * base.pow(exp);
                warn!(
                    "REQUEST_BODY_SIZE_LIMIT not set. Defaulting to {default_request_body_size_limit}"
                );
                default_request_body_size_limit
            }
        };

        let conversion_timeout = match var("CONVERSION_TIMEOUT_IN_S") {
            Ok(v) => {
                let seconds = match v.parse() {
                    Ok(s) => s,
                    Err(e) => {
                        panic!(
                            "CONVERSION_TIMEOUT_IN_S is not a valid whole number of seconds: {:?}",
                            e
                        );
                    }
                };
                Duration::from_secs(seconds)
            }
            Err(_e) => Duration::from_secs(60),
        };

        let conversion_retries = match var("CONVERSION_RETRIES") {
            Ok(val) => match val.parse::<u32>() {
                Ok(n) => n,
                Err(e) => {
                    warn!("Failed to parse CONVERSION_RETRIES ('{val}'): {e}; using 1");
                    1
                }
            },
            Err(_) => 1,
        };

        let unoconv_path = non_empty_or("UNOCONV_PATH", "unoconv");

        let libreoffice_paths = match var("LIBREOFFICE_PATHS") {
            Ok(s) => parse_path_list(&s),
            Err(_) => vec![],
        };
        let libreoffice_paths = if libreoffice_paths.is_empty() {
            DEFAULT_LIBREOFFICE_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect()
        } else {
            libreoffice_paths
        };

        let work_dir = match var("WORK_DIR") {
            Ok(s) if !s.is_empty() => Some(PathBuf::from(s)),
            _ => None,
        };

        Self {
            conversion_retries,
            conversion_timeout,
            db_name,
            environment,
            legacy_db_name,
            legacy_mongodb_uri,
            libreoffice_paths,
            mongodb_uri,
            port,
            request_body_size_limit,
            request_timeout_in_ms,
            s3_access_key_id,
            s3_bucket_name,
            s3_endpoint,
            s3_public_url,
            s3_region,
            s3_secret_access_key,
            sentry_dsn,
            unoconv_path,
            work_dir,
        }
    }

    pub fn has_s3_credentials(&self) -> bool {
        !self.s3_access_key_id.is_empty() && !self.s3_secret_access_key.is_empty()
    }
}

fn non_empty_or(name: &str, default: &str) -> String {
    match var(name) {
        Ok(s) if !s.is_empty() => s,
        _ => {
            warn!("{name} not set. Defaulting to {default}");
            default.to_string()
        }
    }
}

fn parse_path_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn valid_sentry_dsn(url: &str) -> bool {
    url.parse::<Dsn>().is_ok()
}
