//! hookguard
//!
//! - `hookguard` / `hookguard hook`: read one request on stdin, answer via exit status
//! - `hookguard serve`: HTTP evaluation service with hot reload and metrics
//! - `hookguard check`: validate the policy and print what would be loaded

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use hookguard_core::error::{HookGuardError, HookStatus, Result};
use hookguard_core::protocol::HookReply;
use hookguard_engine::{app_state::AppState, config, router, transport::stdio};

#[derive(Parser)]
#[command(name = "hookguard", version, about = "Policy gate for agent tool invocations")]
struct Cli {
    /// Policy file (overrides the XDG lookup).
    #[arg(long, global = true, env = "HOOKGUARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one request from stdin (default).
    Hook,
    /// Serve `POST /v1/evaluate` over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8787")]
        listen: SocketAddr,
    },
    /// Load and compile the policy, then exit.
    Check,
}

/// Log level when `RUST_LOG` is unset. Hook mode stays silent: the host
/// reads all of stderr as the block reason.
fn default_log_level(command: Option<&Command>) -> &'static str {
    match command {
        None | Some(Command::Hook) => "off",
        Some(Command::Check) | Some(Command::Serve { .. }) => "warn",
    }
}

fn init_tracing(default_level: &str) {
    // stdout belongs to the hook protocol.
    fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

/// Exit status for a command line clap refused. Only help and version
/// output count as success; anything else must not read as a block.
fn usage_status(e: &clap::Error) -> HookStatus {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => HookStatus::Approve,
        _ => HookStatus::HookError,
    }
}

fn build_state(explicit: Option<&std::path::Path>) -> Result<AppState> {
    let base = config::config_base_dir();
    let source = config::resolve(explicit, &base)?;
    let cfg = config::load(&source)?;
    tracing::debug!(%source, rules = cfg.rules.len(), "policy loaded");
    AppState::new(&cfg, source, base)
}

fn exit(status: HookStatus) -> ExitCode {
    ExitCode::from(status.code() as u8)
}

fn run_hook(cli: &Cli) -> ExitCode {
    let reply = match build_state(cli.config.as_deref()) {
        Ok(state) => match stdio::read_request(std::io::stdin().lock()) {
            Ok(body) => stdio::handle_guarded(&state, &body, Utc::now()),
            Err(e) => HookReply::from_error(&e),
        },
        Err(e) => {
            tracing::error!(error = %e, "policy failed to load");
            HookReply::from_error(&e)
        }
    };
    exit(stdio::emit(&reply, std::io::stdout().lock(), std::io::stderr().lock()))
}

fn run_check(cli: &Cli) -> ExitCode {
    match build_state(cli.config.as_deref()) {
        Ok(state) => {
            let rules = state.engine().snapshot().map(|s| (s.rules.len(), s.rate_limits.len()));
            match rules {
                Ok((r, l)) => {
                    println!("{}: {r} rules, {l} rate limits", state.source());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{e}");
                    exit(e.hook_status())
                }
            }
        }
        Err(e) => {
            eprintln!("{e}");
            exit(HookStatus::HookError)
        }
    }
}

async fn serve(cli: &Cli, listen: SocketAddr) -> Result<()> {
    let state = build_state(cli.config.as_deref())?;
    let app = router::build_router(state.clone());

    tracing::info!(%listen, source = %state.source(), "hookguard serving");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| HookGuardError::Config(format!("bind {listen} failed: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| HookGuardError::Internal(format!("server failed: {e}")))
}

/// Only serve mode needs a runtime; hook and check stay synchronous.
fn run_serve(cli: &Cli, listen: SocketAddr) -> ExitCode {
    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return exit(HookStatus::HookError);
        }
    };
    match rt.block_on(serve(cli, listen)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "serve failed");
            exit(HookStatus::HookError)
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return exit(usage_status(&e));
        }
    };
    init_tracing(default_log_level(cli.command.as_ref()));

    match &cli.command {
        None | Some(Command::Hook) => run_hook(&cli),
        Some(Command::Check) => run_check(&cli),
        Some(Command::Serve { listen }) => run_serve(&cli, *listen),
    }
}
