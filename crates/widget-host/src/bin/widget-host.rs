//! Widget host CLI - session check, token issuance and a loopback handshake
//! against the configured backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use host_config::{init_logging, HostConfig, Paths};
use ott_handshake::{HttpTokenIssuer, LoopbackFrame, TokenIssuer};
use serde_json::json;
use tracing::info;
use widget_host::{HostShell, SessionBackend, SessionClient, WidgetView};

/// Widget host command-line interface.
#[derive(Parser)]
#[command(name = "widget-host")]
#[command(about = "Host side of the widget one-time token handshake")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and logs. Defaults to ~/.widget-host
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Host session cookie sent to the backend (`name=value`)
    #[arg(long, env = "WIDGET_HOST_SESSION_COOKIE", global = true, hide_env_values = true)]
    session_cookie: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    ShowConfig,
    /// Write the effective configuration to the config file
    InitConfig,
    /// Check whether the host session is authenticated
    CheckSession,
    /// Request a one-time token and print its redacted form
    RequestToken,
    /// Run one handshake against a loopback frame that acknowledges delivery
    Handshake {
        /// Give up after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = HostConfig::load(&paths.config_file())
        .with_context(|| format!("loading {}", paths.config_file().display()))?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    init_logging(&config.log_level, &paths);

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::InitConfig => {
            config.validate()?;
            config.save(&paths)?;
            println!("{}", paths.config_file().display());
        }
        Commands::CheckSession => {
            let mut client = SessionClient::new(&config)?;
            if let Some(cookie) = cli.session_cookie {
                client = client.with_session_cookie(cookie);
            }
            let status = client.check_session().await?;
            let user = status.user().cloned();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "authenticated": status.is_authenticated(),
                    "user": user,
                }))?
            );
        }
        Commands::RequestToken => {
            config.validate()?;
            let host_origin = config.normalized_host_origin()?;
            let mut issuer = HttpTokenIssuer::new(
                config.token_issuer_url()?,
                host_origin.clone(),
                config.request_timeout(),
            )?;
            if let Some(cookie) = cli.session_cookie {
                issuer = issuer.with_session_cookie(cookie);
            }
            let token = issuer.request_token(&config.widget_id, &host_origin).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "ott": token.redacted(),
                    "expires_in": token.expires_in_secs(),
                    "expires_at": token.expires_at(),
                }))?
            );
        }
        Commands::Handshake { timeout_secs } => {
            let view = run_handshake(config, cli.session_cookie, timeout_secs).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            if view != WidgetView::Ready {
                bail!("handshake did not complete: {:?}", view);
            }
        }
    }

    Ok(())
}

/// Mount a loopback frame at the widget origin and play the widget's side.
async fn run_handshake(
    config: HostConfig,
    session_cookie: Option<String>,
    timeout_secs: u64,
) -> anyhow::Result<WidgetView> {
    let widget_origin = config.endpoint()?.origin().to_string();
    let shell = HostShell::from_config(config, session_cookie)?;

    let status = shell.boot().await?;
    if !status.is_authenticated() {
        return Ok(shell.view());
    }

    let frame = Arc::new(LoopbackFrame::loaded(widget_origin.clone()));
    let mount = shell.mount_frame(frame.clone()).await?;
    info!(frame_id = %mount.frame_id, "Loopback frame mounted");
    mount.channel.notify_loaded();

    let mut views = shell.subscribe();
    let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
        let mut acknowledged = 0;
        loop {
            let delivered = frame.delivered_count();
            if delivered > acknowledged {
                acknowledged = delivered;
                mount
                    .channel
                    .deliver(widget_origin.clone(), json!({ "type": "EXCHANGE_COMPLETE" }));
            }
            let view = *views.borrow_and_update();
            if matches!(view, WidgetView::Ready | WidgetView::Unavailable { .. }) {
                return view;
            }
            tokio::select! {
                _ = views.changed() => {}
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
        }
    })
    .await;

    let view = match outcome {
        Ok(view) => view,
        Err(_) => shell.view(),
    };
    shell.unmount_frame().await;
    Ok(view)
}
