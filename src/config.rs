use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shelfmark")]
#[command(about = "Runs the shelfmark catalog service", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the user if needed and print a new bearer token for it
    IssueToken {
        #[arg(long)]
        email: String,
        #[arg(long = "ttl-hours")]
        ttl_hours: Option<i64>,
    },
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".shelfmark")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct App {
    database: String,
    port: i32,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

fn default_session_ttl_hours() -> i64 {
    24 * 30
}

/// Where cover files live; only used to build public URLs.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Storage {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub bucket: String,
}

impl Storage {
    pub fn file_url(&self, file_reference: &str) -> String {
        let key = file_reference
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        crate::get_s3_url(&self.service, &self.bucket, &key)
    }
}

impl App {
    pub fn get_db(&self) -> &str {
        return &self.database;
    }

    pub fn get_port(&self) -> i32 {
        return self.port;
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub storage: Storage,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::parse(&yaml_str)
    }

    pub fn parse(yaml_str: &str) -> Result<Config> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    /// Expands `${VAR}` and `${VAR:-default}` references. Expanded values are not
    /// rescanned; an unterminated or empty reference is an error.
    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut out = String::with_capacity(yaml_str.len());
        let mut rest = yaml_str;

        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                anyhow::bail!("unterminated '${{' in config near: {}", &rest[start..]);
            };

            let reference = &after[..end];
            let (name, default) = match reference.split_once(":-") {
                Some((name, default)) => (name.trim(), Some(default)),
                None => (reference.trim(), None),
            };
            if name.is_empty() {
                anyhow::bail!("empty variable reference '${{{}}}' in config", reference);
            }

            match (env::var(name), default) {
                (Ok(value), _) => out.push_str(&value),
                (Err(_), Some(default)) => out.push_str(default),
                (Err(_), None) => tracing::warn!(var = name, "environment variable not set, using empty value"),
            }
            rest = &after[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults_substituted() {
        let yaml = r#"
app:
  database: ${SHELFMARK_TEST_UNSET_DB:-catalog.db}
  port: 8080
storage:
  service: s3
  bucket: covers
"#;
        let cfg = Config::parse(yaml).unwrap();
        assert_eq!(cfg.app.get_db(), "catalog.db");
        assert_eq!(cfg.app.get_port(), 8080);
        assert_eq!(cfg.app.session_ttl_hours, 720);
        assert_eq!(cfg.storage.bucket, "covers");
    }

    #[test]
    fn substitution_handles_defaults_and_malformed_references() {
        let out = Config::substitute_env_vars("a: ${SHELFMARK_TEST_UNSET_A:-x}\nb: ${SHELFMARK_TEST_UNSET_B}\n").unwrap();
        assert_eq!(out, "a: x\nb: \n");

        assert!(Config::substitute_env_vars("a: ${SHELFMARK_TEST_UNSET_A").is_err());
        assert!(Config::substitute_env_vars("a: ${:-x}").is_err());
        assert_eq!(Config::substitute_env_vars("plain: text").unwrap(), "plain: text");
    }

    #[test]
    fn storage_section_is_optional() {
        let cfg = Config::parse("app:\n  database: a.db\n  port: 1\n").unwrap();
        assert_eq!(cfg.storage.service, "");
    }

    #[test]
    fn file_url_encodes_each_segment() {
        let storage = Storage {
            service: "s3".into(),
            bucket: "covers".into(),
        };
        assert_eq!(
            storage.file_url("books/the dune.png"),
            "https://covers.s3.amazonaws.com/books/the%20dune.png"
        );
    }
}
