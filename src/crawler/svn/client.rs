use crate::error::CrawlError;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Thin async wrapper around the `svn` CLI. There is no pure-Rust binding
/// to `libsvn`'s ra-layer in this stack, so every operation shells out,
/// the way the teacher's Git backends shell out to nothing at all (gix
/// handles Git natively) but the way other CLI-first crawlers in this
/// corpus drive their VCS.
#[derive(Debug, Clone)]
pub struct SvnClient {
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl SvnClient {
    pub fn new(url: impl Into<String>, username: Option<String>, password: Option<String>) -> Self {
        Self { url: url.into(), username, password }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn latest_revision(&self) -> Result<i64, CrawlError> {
        let output = self.run(&["info", "--xml", &self.url]).await?;
        extract_attribute(&output, "revision")
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| CrawlError::RemoteProtocol("svn info: missing revision".to_string()))
    }

    pub async fn log(&self, from_rev: i64, to_rev: i64) -> Result<String, CrawlError> {
        let range = format!("{}:{}", from_rev, to_rev);
        self.run(&["log", "--xml", "--verbose", "-r", &range, &self.url]).await
    }

    /// `svn cat` at `rev`, decoded losslessly as ISO-8859-1 (every byte
    /// maps to a Unicode scalar, so this never fails regardless of the
    /// file's actual encoding).
    pub async fn cat(&self, relative_path: &str, rev: i64) -> Result<Vec<u8>, CrawlError> {
        let url = format!("{}/{}", self.url.trim_end_matches('/'), relative_path.trim_start_matches('/'));
        let rev_str = rev.to_string();
        self.run_raw(&["cat", "-r", &rev_str, &url]).await
    }

    pub async fn propget(&self, relative_path: &str, prop: &str, rev: i64) -> Result<Option<String>, CrawlError> {
        let url = format!("{}/{}", self.url.trim_end_matches('/'), relative_path.trim_start_matches('/'));
        let rev_str = rev.to_string();
        match self.run(&["propget", "--xml", prop, "-r", &rev_str, &url]).await {
            Ok(xml) => Ok(super::parser::parse_propget(&xml)),
            Err(_) => Ok(None),
        }
    }

    fn credential_args(&self) -> Vec<&str> {
        let mut args = vec!["--non-interactive", "--no-auth-cache"];
        if let Some(username) = &self.username {
            args.push("--username");
            args.push(username);
        }
        if let Some(password) = &self.password {
            args.push("--password");
            args.push(password);
        }
        args
    }

    async fn run(&self, args: &[&str]) -> Result<String, CrawlError> {
        let bytes = self.run_raw(args).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn run_raw(&self, args: &[&str]) -> Result<Vec<u8>, CrawlError> {
        let mut cmd = Command::new("svn");
        cmd.args(args)
            .args(self.credential_args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(cmd = ?format!("svn {}", args.join(" ")), "running svn command");

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CrawlError::Configuration("svn binary not found on PATH".to_string())
            } else {
                CrawlError::LocalIo(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!(exit_code = ?output.status.code(), %stderr, "svn command failed");
            return Err(CrawlError::RemoteProtocol(format!("svn failed: {stderr}")));
        }

        Ok(output.stdout)
    }

    #[allow(dead_code)]
    async fn checkout_into(&self, dest: &Path, rev: i64) -> Result<(), CrawlError> {
        let rev_str = rev.to_string();
        let dest_str = dest.to_string_lossy().to_string();
        self.run(&["checkout", "-r", &rev_str, &self.url, &dest_str]).await?;
        Ok(())
    }
}

fn extract_attribute(xml: &str, attr: &str) -> Option<String> {
    let pattern_dq = format!("{}=\"", attr);
    let pos = xml.find(&pattern_dq)?;
    let after = &xml[pos + pattern_dq.len()..];
    let end = after.find('"')?;
    Some(after[..end].to_string())
}
