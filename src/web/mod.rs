//! HTTP 服务：媒体下载 API、媒体流与媒体库管理。

mod error;
mod router;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::base_system::context::Config;
use crate::base_system::retention::RetentionSweeper;
use crate::extractor::ytdlp::YtDlp;
use crate::postprocess::{Ffmpeg, Transcoder};
use state::AppState;

pub const BIND_ENV: &str = "TUBE_VAULT_ADDR";

/// Serve until Ctrl+C. `bind_override` wins over the environment, which wins
/// over the configured address.
pub fn run(config: Config, bind_override: Option<String>) -> Result<()> {
    let bind_raw = bind_override
        .or_else(|| std::env::var(BIND_ENV).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| config.bind_addr.clone());
    let bind_addrs: Vec<SocketAddr> = parse_bind_addrs(&bind_raw)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run_async(bind_addrs, config))
}

fn parse_bind_addr(raw: &str) -> Result<SocketAddr> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(anyhow!("empty bind addr"));
    }

    // Standard formats:
    // - IPv4: 127.0.0.1:5000
    // - IPv6: [::1]:5000
    if let Ok(a) = s.parse::<SocketAddr>() {
        return Ok(a);
    }

    // Tolerate missing brackets for IPv6, e.g. "::1:5000".
    // The last ':' segment is the port if it's all digits.
    if !s.starts_with('[')
        && s.contains(':')
        && let Some((host, port)) = s.rsplit_once(':')
        && !host.is_empty()
        && port.chars().all(|c| c.is_ascii_digit())
        && host.contains(':')
    {
        let wrapped = format!("[{host}]:{port}");
        if let Ok(a) = wrapped.parse::<SocketAddr>() {
            return Ok(a);
        }
    }

    Err(anyhow!(
        "invalid bind address: '{s}'. Use '127.0.0.1:5000' or '[::1]:5000' (IPv6 needs brackets). For multiple binds, separate by comma: '0.0.0.0:5000,[::]:5000'."
    ))
}

fn parse_bind_addrs(raw: &str) -> Result<Vec<SocketAddr>> {
    let parts: Vec<&str> = raw
        .split([',', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(anyhow!("empty bind address list"));
    }

    let mut out = Vec::with_capacity(parts.len());
    for p in parts {
        let a = parse_bind_addr(p)?;
        if !out.contains(&a) {
            out.push(a);
        }
    }
    Ok(out)
}

fn production_state(config: Config, bind_addrs: Vec<SocketAddr>) -> AppState {
    let ffmpeg = Ffmpeg::new(PathBuf::from(config.ffmpeg_path.trim()));
    let ytdlp = YtDlp::new(PathBuf::from(config.ytdlp_path.trim()))
        .with_ffmpeg_location(ffmpeg.location());
    AppState::assemble(config, bind_addrs, Arc::new(ytdlp), Arc::new(ffmpeg))
}

async fn run_async(bind_addrs: Vec<SocketAddr>, config: Config) -> Result<()> {
    let sweeper = RetentionSweeper::new(
        config.layout().retention_dirs(),
        config.max_file_age(),
        config.sweep_interval(),
    );
    let state = production_state(config, bind_addrs.clone());

    let sweeper_token = CancellationToken::new();
    let sweeper_task = sweeper.spawn(sweeper_token.clone());

    // Shared shutdown trigger for all listeners.
    let notify = Arc::new(tokio::sync::Notify::new());
    {
        let notify = notify.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            notify.notify_waiters();
        });
    }

    let mut servers = Vec::new();
    for bind in bind_addrs {
        let listener = match tokio::net::TcpListener::bind(bind).await {
            Ok(l) => l,
            Err(e) => {
                // [::]:PORT may already accept IPv4 on dual-stack hosts, so a
                // later 0.0.0.0:PORT fails with AddrInUse.
                if !servers.is_empty() && e.kind() == std::io::ErrorKind::AddrInUse {
                    warn!(target: "web", bind = %bind, error = %e, "bind failed (AddrInUse), likely already covered by another listener; skipping");
                    continue;
                }
                sweeper_token.cancel();
                return Err(anyhow!(e).context(format!("bind failed: {bind}")));
            }
        };

        info!(target: "web", "listening on http://{bind}/ (set {BIND_ENV} to override)");
        println!("Listening on http://{bind}/");

        let app = router::build_router(state.clone());
        let notify = notify.clone();
        servers.push(tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                notify.notified().await;
            })
            .await
        }));
    }

    if servers.is_empty() {
        sweeper_token.cancel();
        return Err(anyhow!("no listeners started (check {BIND_ENV})"));
    }

    println!("Press Ctrl+C to stop.");

    let mut result = Ok(());
    for h in servers {
        let joined = h
            .await
            .map_err(|e| anyhow!("server task join failed: {e}"))
            .and_then(|r| r.map_err(|e| anyhow!(e)));
        if let Err(e) = joined
            && result.is_ok()
        {
            result = Err(e);
        }
    }

    sweeper_token.cancel();
    if let Err(e) = sweeper_task.await {
        warn!(target: "retention", error = %e, "sweeper task join failed");
    }
    result
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    println!("Stopping server...");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_lists() {
        let v = parse_bind_addrs("127.0.0.1:5000, [::1]:5000;127.0.0.1:5000").unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[1].to_string(), "[::1]:5000");
    }

    #[test]
    fn unbracketed_ipv6_is_tolerated() {
        let a = parse_bind_addr("::1:8080").unwrap();
        assert_eq!(a.port(), 8080);
        assert!(a.is_ipv6());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_bind_addrs(" , ").is_err());
        assert!(parse_bind_addr("localhost").is_err());
    }
}
