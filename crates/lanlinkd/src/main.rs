//! lanlinkd — LAN chat and call-signaling relay daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use lanlink_core::config::LanlinkConfig;
use lanlink_services::{bridge, outbound, peer, BroadcasterTask, PeerRegistry, TransportStats, PEER_TTL};

use lanlinkd::send_worker::SendWorker;
use lanlinkd::transport::Transport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = LanlinkConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = LanlinkConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        LanlinkConfig::default()
    });
    tracing::info!(
        node_id = %config.node.id,
        udp_port = config.network.udp_port,
        api_port = config.network.api_port,
        "lanlinkd starting"
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // Shared state
    let stats = Arc::new(TransportStats::new());
    let peers = PeerRegistry::new();
    let (poster, drain) = bridge::channel();
    let (outbound_tx, outbound_rx) = outbound::channel();

    // Bind failure after the last retry is fatal.
    let transport = Transport::start(&config, poster, stats.clone())
        .await
        .context("transport startup failed")?;

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    // The broadcaster gets its own stop signal, fired only after the receive
    // thread has exited, so its final drain sees every posted event.
    let (flush_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let (broadcaster, clients) = BroadcasterTask::new(drain, flush_tx.subscribe());
    let mut broadcaster_task = tokio::spawn(broadcaster.run());
    let mut broadcaster_done = false;

    let expiry_task = tokio::spawn(peer::expiry_loop(
        peers.clone(),
        PEER_TTL,
        shutdown_tx.subscribe(),
    ));

    let send_worker_task = tokio::spawn(
        SendWorker::new(transport.sender(), outbound_rx, shutdown_tx.subscribe()).run(),
    );

    let api_task = {
        let state = lanlink_api::ApiState {
            node_id: config.node.id.clone(),
            udp_port: transport.local_addr().port(),
            broadcast_ports: config.network.broadcast_ports.clone(),
            clients: clients.clone(),
            queue_depth: config.clients.queue_depth,
            peers: peers.clone(),
            stats: stats.clone(),
            outbound: outbound_tx,
            shutdown_tx: shutdown_tx.clone(),
        };
        let bind = config.network.api_bind;
        let port = config.network.api_port;
        tokio::spawn(async move {
            if let Err(e) = lanlink_api::serve(state, bind, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    let stats_printer = {
        let stats = stats.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let s = stats.snapshot();
                tracing::info!(
                    received = s.datagrams_received,
                    sent = s.datagrams_sent,
                    reassembled = s.messages_reassembled,
                    expired = s.messages_expired,
                    "transport stats"
                );
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv()      => tracing::info!("shutting down"),
        r = &mut broadcaster_task   => {
            tracing::error!("broadcaster exited: {:?}", r);
            broadcaster_done = true;
        }
        r = expiry_task             => tracing::error!("expiry task exited: {:?}", r),
        r = send_worker_task        => tracing::error!("send worker exited: {:?}", r),
        r = api_task                => tracing::error!("API server exited: {:?}", r),
        r = stats_printer           => tracing::error!("stats printer exited: {:?}", r),
    }

    // A task exiting on its own must still bring the rest down.
    let _ = shutdown_tx.send(());

    tokio::task::spawn_blocking(move || transport.stop())
        .await
        .context("receive thread join failed")?;

    let _ = flush_tx.send(());
    if !broadcaster_done
        && tokio::time::timeout(Duration::from_secs(2), &mut broadcaster_task)
            .await
            .is_err()
    {
        tracing::warn!("broadcaster did not stop in time");
    }

    tracing::info!("lanlinkd stopped");
    Ok(())
}
