//! VoiceGate daemon entry point.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voicegate::access::AccessStore;
use voicegate::agents::{main_agent, security_agent, AgentRegistry};
use voicegate::ai::ModelChoice;
use voicegate::call::{CallLogBuffer, CallLogLayer};
use voicegate::config::AppConfig;
use voicegate::server::{self, AppState};
use voicegate::sip::SipUserAgent;
use voicegate::{db, runtime};

/// Dashboard event fan-out capacity; slow consumers are dropped past this
const EVENT_BUS_CAPACITY: usize = 256;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // The call-log layer is installed once; supervisors attach a buffer per
    // call.
    let call_log = CallLogBuffer::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voicegate=info".parse().expect("valid directive")),
        )
        .with(CallLogLayer::new(call_log.clone()))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config, call_log).await {
        tracing::error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(
    config: Arc<AppConfig>,
    call_log: CallLogBuffer,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("=== VoiceGate starting ===");

    if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pool = db::init_pool(&config.database_path).await?;
    let access = Arc::new(AccessStore::new(pool.clone()));

    // Explicit registration table: the gate, the dispatcher, and any
    // externally provided specialists get registered here before the
    // dispatcher is built from their infos.
    let mut registry = AgentRegistry::new();
    registry.register(security_agent(config.unlock_code.clone()));
    registry.register(main_agent(&[]));
    let registry = Arc::new(registry);
    tracing::info!("{} agents registered", registry.len());

    let (sip_agent, sip_events) = SipUserAgent::new(config.sip.clone());
    let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);

    let state = AppState {
        config: config.clone(),
        pool,
        access: access.clone(),
        registry,
        sip: sip_agent.clone(),
        events,
        active_call: Arc::new(RwLock::new(None)),
        default_model: Arc::new(std::sync::RwLock::new(ModelChoice::Mini)),
    };

    sip_agent
        .set_incoming_decider(runtime::make_decider(&state))
        .await;

    // SIP stack; runs for the process lifetime unless unconfigured
    if config.sip.validate().is_ok() {
        let agent = sip_agent.clone();
        tokio::spawn(async move {
            if let Err(e) = agent.run().await {
                tracing::error!("SIP user agent stopped: {}", e);
            }
        });
    } else {
        tracing::warn!("SIP not configured, running dashboard-only");
    }

    // SIP event -> supervisor wiring
    tokio::spawn(runtime::sip_event_loop(
        state.clone(),
        access,
        call_log,
        sip_events,
    ));

    // Dashboard surface
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("dashboard listening on {}", config.listen_addr);
    tracing::info!("=== VoiceGate ready ===");

    axum::serve(listener, server::create_router(state)).await?;
    Ok(())
}
