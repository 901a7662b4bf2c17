// SPDX-FileCopyrightText: 2026 Lumina Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `lumina serve` command implementation.
//!
//! Opens the database, wires the router, ledger, and takeover manager over
//! it, then runs the session reaper and the HTTP gateway until a shutdown
//! signal arrives.

use std::sync::Arc;

use lumina_config::model::LuminaConfig;
use lumina_core::{ConversationStore, LuminaError, OutboundTransport, ReplyGenerator};
use lumina_escalation::EscalationLedger;
use lumina_router::{GuardedGenerator, HttpReplyGenerator, MessageRouter};
use lumina_storage::{Database, SqliteConversationStore};
use lumina_takeover::{Outbound, SessionReaper, TakeoverManager};
use tracing::{info, warn};

use crate::shutdown;

/// The wired control core, shared by `serve` and the one-shot commands.
pub struct Core {
    pub db: Database,
    pub ledger: EscalationLedger,
    pub manager: TakeoverManager,
    pub router: Arc<MessageRouter>,
}

/// Build the control core from configuration.
pub async fn build_core(config: &LuminaConfig) -> Result<Core, LuminaError> {
    let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
    let store = Arc::new(SqliteConversationStore::new(db.clone()));
    let ledger = EscalationLedger::new(db.clone());

    #[cfg_attr(not(feature = "whatsapp"), allow(unused_mut))]
    let mut outbound = Outbound::default();
    #[cfg(feature = "whatsapp")]
    {
        if let Some(transport) = lumina_whatsapp::WhatsAppTransport::from_config(&config.whatsapp)? {
            info!("whatsapp transport enabled");
            outbound.register(Arc::new(transport) as Arc<dyn OutboundTransport>);
        }
    }
    let manager = TakeoverManager::new(db.clone(), &config.takeover).with_outbound(outbound);

    let generator = HttpReplyGenerator::from_config(&config.generator)?
        .map(|g| Arc::new(g) as Arc<dyn ReplyGenerator>);
    if generator.is_none() {
        warn!("no reply generator endpoint configured, every reply will use the fallback");
    }
    let guarded = GuardedGenerator::new(generator, &config.generator);

    let router = Arc::new(MessageRouter::new(
        store as Arc<dyn ConversationStore>,
        manager.clone(),
        ledger.clone(),
        guarded,
        &config.escalation,
        &config.generator,
    ));

    Ok(Core {
        db,
        ledger,
        manager,
        router,
    })
}

/// Runs the `lumina serve` command.
pub async fn run_serve(config: LuminaConfig) -> Result<(), LuminaError> {
    info!(name = %config.agent.name, "starting lumina serve");

    let prometheus = if config.prometheus.enabled {
        match lumina_prometheus::PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics enabled");
                Some(adapter)
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        None
    };

    let core = build_core(&config).await?;
    let active = core.manager.list_sessions(None).await?.len();
    lumina_prometheus::set_takeover_sessions(active as u64);
    info!(active_sessions = active, "control core ready");

    let cancel = shutdown::install_signal_handler();
    let mut tasks = tokio::task::JoinSet::new();

    if config.reaper.enabled {
        let reaper = SessionReaper::new(
            core.manager.clone(),
            core.ledger.clone(),
            config.reaper.clone(),
        );
        tasks.spawn(reaper.run(cancel.clone()));
    } else {
        info!("session reaper disabled by configuration");
    }

    #[cfg(feature = "gateway")]
    {
        if config.gateway.enabled {
            let mut state = lumina_gateway::GatewayState::new(
                core.router.clone(),
                config.gateway.bearer_token.clone(),
            );
            if config.whatsapp.enabled
                && let (Some(app_secret), Some(verify_token)) = (
                    config.whatsapp.app_secret.clone(),
                    config.whatsapp.verify_token.clone(),
                )
            {
                state = state.with_whatsapp(lumina_gateway::WhatsAppWebhook {
                    app_secret,
                    verify_token,
                });
            }
            if let Some(adapter) = prometheus.clone() {
                state = state.with_metrics(Arc::new(move || adapter.render()));
            }
            let server_config = lumina_gateway::ServerConfig {
                host: config.gateway.host.clone(),
                port: config.gateway.port,
            };
            let gateway_cancel = cancel.clone();
            tasks.spawn(async move {
                if let Err(e) =
                    lumina_gateway::start_server(&server_config, state, gateway_cancel.clone()).await
                {
                    tracing::error!(error = %e, "gateway stopped with an error");
                    gateway_cancel.cancel();
                }
            });
        } else {
            warn!("gateway disabled: no inbound messages will be accepted");
        }
    }

    #[cfg(not(feature = "gateway"))]
    let _ = &prometheus;

    cancel.cancelled().await;
    info!("shutting down");
    while tasks.join_next().await.is_some() {}

    core.db.close().await?;
    info!("lumina stopped");
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lumina={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
