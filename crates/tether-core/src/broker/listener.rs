//! Broker subscription loop
//!
//! Subscribes to the agent-originated control and data wildcards and
//! dispatches every publish to the configured sink. Handler dispatch
//! is bounded by a semaphore; once the limit is reached the event loop
//! blocks on the next permit, which exerts back-pressure on the
//! broker connection.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use tokio::sync::{Semaphore, broadcast, mpsc};

use tether_api::topic;
use tether_common::TetherError;

use crate::pipeline::ControlMessageSink;

/// Listener configuration
pub struct ListenerConfig {
    pub topic_prefix: String,
    pub subscription_qos: QoS,
    /// Maximum concurrently dispatched message handlers
    pub concurrency_limit: usize,
}

/// Drive the broker event loop until shutdown or a fatal handler error.
///
/// Returns `Err` only for fatal conditions; the process must not keep
/// consuming traffic it cannot process.
pub async fn run(
    client: AsyncClient,
    mut event_loop: EventLoop,
    config: ListenerConfig,
    sink: Arc<dyn ControlMessageSink>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), TetherError> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<TetherError>(1);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Broker listener shutting down");
                let _ = client.disconnect().await;
                return Ok(());
            }
            Some(err) = fatal_rx.recv() => {
                tracing::error!(error = %err, "Fatal handler error, stopping broker listener");
                let _ = client.disconnect().await;
                return Err(err);
            }
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    subscribe(&client, &config).await?;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    // Back-pressure: block the event loop once the
                    // handler limit is reached.
                    let permit = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                        .map_err(TetherError::fatal)?;
                    let sink = sink.clone();
                    let fatal_tx = fatal_tx.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(err) =
                            sink.handle(&publish.topic, &publish.payload, publish.pkid).await
                        {
                            if err.is_fatal() {
                                let _ = fatal_tx.send(err).await;
                            } else {
                                tracing::warn!(
                                    topic = %publish.topic,
                                    error = %err,
                                    "Message handler failed"
                                );
                            }
                        }
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Broker connection error, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

async fn subscribe(client: &AsyncClient, config: &ListenerConfig) -> Result<(), TetherError> {
    let control = topic::control_out_wildcard(&config.topic_prefix);
    let data = topic::data_out_wildcard(&config.topic_prefix);
    client
        .subscribe(control.clone(), config.subscription_qos)
        .await
        .map_err(TetherError::transient)?;
    client
        .subscribe(data.clone(), config.subscription_qos)
        .await
        .map_err(TetherError::transient)?;
    tracing::info!(control = %control, data = %data, "Subscribed to agent topics");
    Ok(())
}
