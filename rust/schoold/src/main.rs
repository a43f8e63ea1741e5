use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use serde_json::json;

use schoold::config::Config;
use schoold::{bootstrap, db, http, ipc, logging};

fn serve_stdio(mut state: ipc::AppState) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            // Can't reply with an id we failed to parse.
            Err(e) => json!({
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() }
            }),
        };
        writeln!(stdout, "{}", resp).context("failed to write response")?;
        stdout.flush().context("failed to flush stdout")?;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn serve_http(cfg: &Config, state: ipc::AppState) -> anyhow::Result<()> {
    let app = http::router(Arc::new(Mutex::new(state)));
    let address = cfg.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!(address = %address, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cfg = Config::parse();
    logging::init_tracing(&cfg.log_level);

    let conn = db::open_db(&cfg.data_dir)?;
    bootstrap::initialize_admin(&conn, &cfg)?;
    tracing::info!(
        data_dir = %cfg.data_dir.to_string_lossy(),
        pass_threshold = cfg.pass_threshold,
        "database ready"
    );

    let state = ipc::AppState {
        data_dir: Some(cfg.data_dir.clone()),
        db: conn,
        policy: cfg.policy(),
    };

    if cfg.stdio {
        // Reading stdin blocks, so keep it off the async workers.
        tokio::task::spawn_blocking(move || serve_stdio(state))
            .await
            .context("stdio loop panicked")?
    } else {
        serve_http(&cfg, state).await
    }
}
