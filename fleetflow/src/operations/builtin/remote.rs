//! `git.remote-protocol`: switch a remote between HTTPS and SSH URLs.

use crate::core::{ExecutionOutcome, OutcomeCode};
use crate::operations::{parse_options, Operation, StepContext};
use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote URL flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProtocol {
    /// `https://host/owner/name.git`
    Https,
    /// `git@host:owner/name.git`
    Ssh,
}

impl fmt::Display for RemoteProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Https => f.write_str("https"),
            Self::Ssh => f.write_str("ssh"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteProtocolOptions {
    to: RemoteProtocol,
    #[serde(default)]
    remote: Option<String>,
}

/// Rewrites a remote URL to the requested protocol, or `None` if it cannot be parsed.
#[must_use]
pub fn convert_remote_url(url: &str, to: RemoteProtocol) -> Option<String> {
    let (host, path) = split_remote(url)?;
    Some(match to {
        RemoteProtocol::Https => format!("https://{host}/{path}"),
        RemoteProtocol::Ssh => format!("git@{host}:{path}"),
    })
}

fn split_remote(url: &str) -> Option<(&str, &str)> {
    let url = url.trim();
    let (host, path) = match ["https://", "http://", "ssh://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
    {
        Some(rest) => {
            let (authority, path) = rest.split_once('/')?;
            let host = authority.rsplit('@').next().unwrap_or(authority);
            (host.split(':').next().unwrap_or(host), path)
        }
        None => {
            let (authority, path) = url.split_once(':')?;
            (authority.rsplit('@').next().unwrap_or(authority), path)
        }
    };
    let path = path.trim_start_matches('/');
    (!host.is_empty() && !path.is_empty()).then_some((host, path))
}

/// Converts the configured remote between HTTPS and SSH.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteProtocolOp;

#[async_trait]
impl Operation for RemoteProtocolOp {
    fn key(&self) -> &str {
        "git.remote-protocol"
    }

    async fn run(
        &self,
        ctx: &mut StepContext<'_>,
        options: &serde_json::Value,
    ) -> anyhow::Result<ExecutionOutcome> {
        let opts: RemoteProtocolOptions = parse_options(self.key(), options)?;
        let remote = opts
            .remote
            .unwrap_or_else(|| ctx.services.config.remote.clone());

        let Some(url) = ctx.services.git.remote_url(ctx.root(), &remote).await? else {
            ctx.log.warn(format!("remote '{remote}' is not configured"));
            return Ok(ExecutionOutcome::skipped(
                OutcomeCode::NoRemote,
                format!("remote '{remote}' is not configured"),
            ));
        };
        let Some(converted) = convert_remote_url(&url, opts.to) else {
            bail!("cannot parse remote URL '{url}'");
        };
        if converted == url {
            return Ok(ExecutionOutcome::skipped(
                OutcomeCode::NoChanges,
                format!("remote '{remote}' already uses {}", opts.to),
            ));
        }
        if ctx.dry_run() {
            return Ok(ExecutionOutcome::skipped(
                OutcomeCode::DryRun,
                format!("would set {remote} to {converted}"),
            ));
        }

        ctx.services
            .git
            .set_remote_url(ctx.root(), &remote, &converted)
            .await?;
        ctx.log.info(format!("{remote}: {url} -> {converted}"));
        Ok(ExecutionOutcome::applied(format!("{remote} now uses {}", opts.to))
            .with_detail("url", serde_json::json!(converted)))
    }
}
