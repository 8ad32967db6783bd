//! Background maintenance: expire challenges and drop idle ledger records.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::RedemptionEngine;

pub async fn maintenance_worker(
    engine: Arc<RedemptionEngine>,
    interval_secs: u64,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!("🧹 Maintenance worker started (every {}s)", interval_secs);

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let (challenges, records) = engine.sweep(chrono::Utc::now().timestamp()).await;
                if challenges > 0 || records > 0 {
                    tracing::debug!(challenges, records, "Maintenance sweep");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("🧹 Maintenance worker shutting down...");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{engine_with, fake_guild};

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(engine_with(&dir, Arc::new(fake_guild())).await);
        let (tx, rx) = tokio::sync::broadcast::channel(1);

        let handle = tokio::spawn(maintenance_worker(engine, 1, rx));
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
