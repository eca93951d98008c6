//! Background tasks hosted by every gateway node

use crate::broadcast::DeliveryRouter;
use crate::handlers::offline;
use crate::server::GatewayState;
use relay_core::MessageCommittedEvent;
use relay_service::run_reconciler;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Start the delivery router, the reconciler and the offline sweep
pub fn spawn_background_tasks(
    state: &GatewayState,
    events: broadcast::Receiver<MessageCommittedEvent>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let router = DeliveryRouter::new(state.registry().clone());
    let delivery = state.config().delivery.clone();
    let sweep_interval = state.config().offline.sweep_interval();

    vec![
        tokio::spawn(router.run(events, shutdown.clone())),
        tokio::spawn(run_reconciler(
            state.service_context().clone(),
            delivery.reconcile_interval(),
            shutdown.clone(),
        )),
        tokio::spawn(run_offline_sweep(state.clone(), sweep_interval, shutdown)),
    ]
}

/// Periodically replay due offline entries to users connected here
pub async fn run_offline_sweep(
    state: GatewayState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if state.registry().is_empty() {
                    continue;
                }
                let pushed = offline::sweep(state.service_context(), state.registry()).await;
                if pushed > 0 {
                    tracing::info!(pushed, "Offline sweep pushed queued messages");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!("Offline sweep stopping");
                    break;
                }
            }
        }
    }
}
