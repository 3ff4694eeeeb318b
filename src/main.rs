use std::sync::Arc;

use tokio::net::TcpListener;

use stream_voicebot::cache::AudioCache;
use stream_voicebot::server::{self, ServerDeps};
use stream_voicebot::session::new_session_map;
use stream_voicebot::{config, logging, registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let server_cfg = config::server_config();
    if !config::ai_ready() {
        // /health keeps serving; calls are rejected at the upgrade.
        log::error!(
            "[main] OPENAI_API_KEY is not set: health endpoint only, all calls will be rejected"
        );
    }

    let cache = Arc::new(AudioCache::new().await);
    if config::ai_ready() {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache.prime_defaults().await;
        });
    }

    let deps = Arc::new(ServerDeps {
        registry: registry::from_env(),
        cache,
        sessions: new_session_map(),
    });

    let listener = TcpListener::bind((server_cfg.bind_ip.as_str(), server_cfg.port)).await?;
    log::info!(
        "[main] voicebot up on {}:{} (ws path /streams)",
        server_cfg.bind_ip,
        server_cfg.port
    );

    tokio::select! {
        res = server::run(listener, deps) => {
            if let Err(err) = res {
                log::error!("[main] server loop error: {:?}", err);
            }
        }
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                log::warn!("[main] shutdown signal error: {:?}", err);
            }
            log::info!("[main] shutting down");
        }
    }
    Ok(())
}
