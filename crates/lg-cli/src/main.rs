//! CLI entry point for livegit.
//!
//! livegit watches a directory that need not be a git repository, records
//! every debounced batch of edits as a commit in a private mirror, and serves
//! the result over HTTP so that anyone can `git clone` the live tree.
//!
//! # Usage
//!
//! ```bash
//! livegit [OPTIONS]
//!
//! # Mirror the current directory on port 8000
//! livegit
//!
//! # Mirror a project under a URL prefix
//! livegit --path ~/src/project --port 9000 --prefix /user/module
//!
//! # Clone it from another machine
//! git clone http://host:9000/user/module
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::eyre::{WrapErr, eyre};
use lg_core::{Config, ServeConfig};
use lg_mirror::{GitCli, Pipeline, Workspace};
use lg_serve::PathRewritingServer;
use lg_watcher::{ChangeWatcher, IgnoreMatcher};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Mirror live edits of a directory into a git history and serve it for cloning.
///
/// Runs until interrupted (Ctrl-C or SIGTERM).
#[derive(Debug, Parser)]
#[command(name = "livegit", version, about, long_about = None)]
struct Cli {
    /// Directory to watch.
    ///
    /// Defaults to the current directory.
    #[arg(short, long, env = "LIVEGIT_PATH")]
    path: Option<Utf8PathBuf>,

    /// Port to serve the repository on.
    #[arg(long, env = "LIVEGIT_PORT")]
    port: Option<u16>,

    /// Address to bind.
    #[arg(long, env = "LIVEGIT_HOST")]
    host: Option<String>,

    /// URL prefix the repository is served under.
    #[arg(long, env = "LIVEGIT_PREFIX")]
    prefix: Option<String>,

    /// Debounce window in milliseconds.
    #[arg(long, env = "LIVEGIT_DEBOUNCE_MS")]
    debounce_ms: Option<u64>,

    /// JSON configuration file; command-line values take precedence.
    #[arg(short, long, env = "LIVEGIT_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Noisy crates like `hyper` and `mio` are filtered to `warn` level.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},hyper=warn,mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Builds a validated [`Config`] from the optional config file and CLI arguments.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or the result is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .wrap_err_with(|| format!("Failed to load configuration from {path}"))?,
        None => Config::default(),
    };

    if let Some(path) = &cli.path {
        config.watch.root.clone_from(path);
    }
    if let Some(port) = cli.port {
        config.serve.port = port;
    }
    if let Some(host) = &cli.host {
        config.serve.host.clone_from(host);
    }
    if let Some(prefix) = &cli.prefix {
        config.serve.prefix.clone_from(prefix);
    }
    if let Some(debounce_ms) = cli.debounce_ms {
        config.watch.debounce_ms = debounce_ms;
    }

    config.validate()?;
    config.watch.root = config
        .watch
        .root
        .canonicalize_utf8()
        .wrap_err_with(|| format!("Cannot resolve {}", config.watch.root))?;

    Ok(config)
}

/// Returns the URL a client should clone from.
fn clone_url(config: &ServeConfig) -> String {
    let host = match config.host.as_str() {
        "0.0.0.0" | "::" | "[::]" => "localhost",
        other => other,
    };
    format!("http://{host}:{}{}", config.port, config.normalized_prefix())
}

/// Cancels `cancel` on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                    () = cancel.cancelled() => return,
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "Cannot listen for SIGTERM");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
                    () = cancel.cancelled() => return,
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
            () = cancel.cancelled() => return,
        }
    }

    cancel.cancel();
}

// =============================================================================
// RUN
// =============================================================================

/// Bootstraps the mirror, then watches, mirrors and serves until cancelled.
///
/// # Errors
///
/// Returns an error for startup failures and if a background task fails.
async fn run(config: Config) -> color_eyre::Result<()> {
    let root = config.watch.root.clone();
    info!(path = %root, "Starting livegit");

    let workspace = Workspace::create(&config.mirror.workspace_prefix)?;
    workspace.ensure_outside(&root)?;
    let matcher = Arc::new(IgnoreMatcher::load(&root, &config.watch.ignore_file)?);

    let git = GitCli::new(workspace.mirror());
    if !git.is_available() {
        return Err(eyre!("The `git` executable was not found on PATH"));
    }

    // Watch before the import walk so edits made during bootstrap are queued
    // for the first batch instead of being lost.
    let cancel = CancellationToken::new();
    let watcher = ChangeWatcher::new(&config.watch, Arc::clone(&matcher))?;
    let changes = watcher.watch(cancel.clone())?;

    let pipeline = {
        let mirror_config = config.mirror.clone();
        let root = root.clone();
        let mirror = workspace.mirror();
        let published = workspace.published();
        let matcher = Arc::clone(&matcher);
        tokio::task::spawn_blocking(move || {
            Pipeline::bootstrap(&mirror_config, &root, &mirror, &published, matcher, git)
        })
        .await?
        .wrap_err("Failed to initialize the mirror")?
    };

    let listener = PathRewritingServer::bind(&config.serve).await?;
    let server = PathRewritingServer::new(&workspace.published(), &config.serve);
    let server = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let result = server.run(listener, cancel.clone()).await;
            // A dead server leaves nothing to mirror for.
            cancel.cancel();
            result
        }
    });

    tokio::spawn(shutdown_signal(cancel.clone()));

    let url = clone_url(&config.serve);
    info!("Ready. Clone with: git clone {url}");

    let report = pipeline.run(changes.into_stream()).await;
    cancel.cancel();
    server.await??;

    let report = report?;
    info!(report = %serde_json::to_string(&report)?, "Mirrored session summary");

    workspace.close()?;
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Merge file and command-line configuration
    let config = build_config(&cli)?;

    run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("livegit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert!(cli.path.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let config_path = root.join("livegit.json");
        std::fs::write(
            &config_path,
            r#"{"serve": {"port": 9000, "prefix": "/from/file"}, "watch": {"debounce_ms": 50}}"#,
        )
        .unwrap();

        let cli = parse(&[
            "--path",
            root.as_str(),
            "--config",
            config_path.as_str(),
            "--port",
            "9100",
        ]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.serve.port, 9100);
        assert_eq!(config.serve.prefix, "/from/file");
        assert_eq!(config.watch.debounce_ms, 50);
        assert!(config.watch.root.is_absolute());
    }

    #[test]
    fn test_missing_path_is_rejected() {
        let cli = parse(&["--path", "/nonexistent/livegit/tree"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_clone_url() {
        let mut config = ServeConfig::default();
        assert_eq!(clone_url(&config), "http://localhost:8000/");

        config.host = "192.168.1.5".to_owned();
        config.port = 9000;
        config.prefix = "/user/module".to_owned();
        assert_eq!(clone_url(&config), "http://192.168.1.5:9000/user/module/");
    }
}
