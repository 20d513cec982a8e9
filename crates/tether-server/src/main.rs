//! Main entry point for the Tether server.
//!
//! Assembles the connection store, the broker client, the selected
//! pipeline topology, the reconciliation sweepers, and the HTTP
//! dispatch API, then runs them until a termination signal.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use rumqttc::{AsyncClient, MqttOptions};
use tracing::{error, info};

use tether_core::broker::listener::{self, ListenerConfig};
use tether_core::broker::{MqttBroker, qos_from_level};
use tether_core::bridge::EventBusProducer;
use tether_core::identity::{
    ConfigIdentityResolver, FixedIdentityResolver, GatewayIdentityResolver, IdentityResolver,
};
use tether_core::inventory::{InventoryReporter, KafkaInventoryReporter, NoopInventoryReporter};
use tether_core::pipeline::{BridgeSink, ControlMessageSink, DirectSink};
use tether_core::sources::{HttpSourcesReporter, NoopSourcesReporter, SourcesReporter};
use tether_core::sweeper::{self, RetentionSweeper, StaleSweeper, TenantlessSweeper};
use tether_persistence::{ConnectionStore, MemoryConnectionStore, SqlConnectionStore};
use tether_server::model::{AppState, Configuration};
use tether_server::startup;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let configuration = Configuration::new();

    let logging_config = startup::LoggingConfig::from_env();
    let _logging_guard = startup::init_logging(&logging_config)?;

    tether_server::metrics::init_metrics();
    let metrics_addr: SocketAddr = format!(
        "{}:{}",
        configuration.metrics_address(),
        configuration.metrics_port()
    )
    .parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    info!("Metrics exporter listening on {}", metrics_addr);

    // Connection state store
    let store: Arc<dyn ConnectionStore> = match configuration.storage_mode().as_str() {
        "memory" => {
            info!("Using in-memory connection store (volatile)");
            Arc::new(MemoryConnectionStore::new())
        }
        _ => {
            let db = configuration.database_connection().await?;
            info!("Connected to connection store database");
            Arc::new(SqlConnectionStore::new(
                db,
                configuration.database_query_timeout(),
            ))
        }
    };

    // External collaborators, each selected by configuration string
    let resolver = build_resolver(&configuration)?;
    let inventory = build_inventory(&configuration).await?;
    let sources = build_sources(&configuration)?;

    // Broker client
    let broker_url = url::Url::parse(&configuration.broker_url())?;
    let host = broker_url
        .host_str()
        .ok_or("broker URL lacks a host")?
        .to_string();
    let port = broker_url.port().unwrap_or(1883);
    let mut mqtt_options = MqttOptions::new(configuration.broker_client_id(), host, port);
    mqtt_options.set_keep_alive(configuration.broker_keep_alive());
    if let (Some(username), Some(password)) = (
        configuration.broker_username(),
        configuration.broker_password(),
    ) {
        mqtt_options.set_credentials(username, password);
    }
    let (mqtt_client, event_loop) = AsyncClient::new(mqtt_options, 64);

    let broker = Arc::new(MqttBroker::new(
        mqtt_client.clone(),
        configuration.topic_prefix(),
        configuration.control_qos(),
        configuration.data_qos(),
        configuration.broker_publish_timeout(),
    ));

    // Pipeline topology
    let topology = configuration.pipeline_topology();
    let sink: Arc<dyn ControlMessageSink> = match topology.as_str() {
        "bridge" => {
            let producer = EventBusProducer::connect(
                configuration.kafka_brokers(),
                configuration.bridge_topic(),
                configuration.kafka_publish_timeout(),
            )
            .await?;
            info!("Pipeline topology: event bridge");
            Arc::new(BridgeSink::new(Arc::new(producer)))
        }
        _ => {
            info!("Pipeline topology: direct");
            Arc::new(DirectSink::new(
                store.clone(),
                resolver.clone(),
                inventory.clone(),
                sources.clone(),
                broker.clone(),
                configuration.reconnect_delay_secs(),
            ))
        }
    };

    // Graceful shutdown fan-out
    let shutdown = startup::wait_for_shutdown_signal();

    // Broker subscription loop
    let listener_config = ListenerConfig {
        topic_prefix: configuration.topic_prefix(),
        subscription_qos: qos_from_level(configuration.subscription_qos()),
        concurrency_limit: configuration.dispatcher_concurrency_limit(),
    };
    let mut listener_task = tokio::spawn(listener::run(
        mqtt_client,
        event_loop,
        listener_config,
        sink,
        shutdown.subscribe(),
    ));

    // Reconciliation sweepers; zero interval leaves a sweeper to
    // external scheduling
    spawn_sweepers(&configuration, &shutdown, store.clone(), resolver, inventory);

    // HTTP dispatch API
    let app_state = Arc::new(AppState {
        configuration: configuration.clone(),
        store,
        broker,
    });
    let server = startup::http_server(
        app_state,
        configuration.context_path(),
        configuration.http_address(),
        configuration.http_port(),
        configuration.http_shutdown_timeout().as_secs(),
    )?;
    let server_handle = server.handle();
    info!(
        "Tether server listening on {}:{}",
        configuration.http_address(),
        configuration.http_port()
    );

    let mut shutdown_rx = shutdown.subscribe();
    let mut listener_done = false;
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
        }
        result = &mut listener_task => {
            listener_done = true;
            match result {
                Ok(Err(e)) => error!("Broker listener failed: {}", e),
                Err(e) => error!("Broker listener panicked: {}", e),
                Ok(Ok(())) => {}
            }
            shutdown.shutdown();
            server_handle.stop(true).await;
        }
        _ = shutdown_rx.recv() => {
            info!("Shutting down HTTP server");
            server_handle.stop(true).await;
        }
    }

    // Drain the broker connection before exit
    shutdown.shutdown();
    if !listener_done {
        let _ = listener_task.await;
    }
    tokio::time::sleep(configuration.broker_quiesce()).await;

    info!("Tether server shutdown complete");
    Ok(())
}

fn build_resolver(
    configuration: &Configuration,
) -> Result<Arc<dyn IdentityResolver>, Box<dyn std::error::Error>> {
    let resolver: Arc<dyn IdentityResolver> = match configuration.identity_resolver_impl().as_str()
    {
        "config" => {
            info!("Identity resolver: static configuration map");
            Arc::new(ConfigIdentityResolver::new(configuration.identity_mapping()))
        }
        "fixed" => {
            info!("Identity resolver: fixed tenant");
            Arc::new(FixedIdentityResolver::new(
                configuration.identity_fixed_account(),
                configuration.identity_fixed_org_id(),
            ))
        }
        _ => {
            info!(
                "Identity resolver: auth gateway at {}",
                configuration.identity_gateway_url()
            );
            Arc::new(GatewayIdentityResolver::new(
                configuration.identity_gateway_url(),
                configuration.identity_gateway_timeout(),
            )?)
        }
    };
    Ok(resolver)
}

async fn build_inventory(
    configuration: &Configuration,
) -> Result<Arc<dyn InventoryReporter>, Box<dyn std::error::Error>> {
    let inventory: Arc<dyn InventoryReporter> = match configuration.inventory_impl().as_str() {
        "noop" => {
            info!("Inventory reporter disabled");
            Arc::new(NoopInventoryReporter)
        }
        _ => {
            let producer = EventBusProducer::connect(
                configuration.kafka_brokers(),
                configuration.inventory_topic(),
                configuration.kafka_publish_timeout(),
            )
            .await?;
            Arc::new(KafkaInventoryReporter::new(
                Arc::new(producer),
                configuration.inventory_stale_offset(),
            ))
        }
    };
    Ok(inventory)
}

fn build_sources(
    configuration: &Configuration,
) -> Result<Arc<dyn SourcesReporter>, Box<dyn std::error::Error>> {
    let sources: Arc<dyn SourcesReporter> = match configuration.sources_impl().as_str() {
        "noop" => {
            info!("Sources reporter disabled");
            Arc::new(NoopSourcesReporter)
        }
        _ => {
            info!("Sources reporter: {}", configuration.sources_url());
            Arc::new(HttpSourcesReporter::new(
                configuration.sources_url(),
                configuration.sources_timeout(),
            )?)
        }
    };
    Ok(sources)
}

fn spawn_sweepers(
    configuration: &Configuration,
    shutdown: &startup::ShutdownSignal,
    store: Arc<dyn ConnectionStore>,
    resolver: Arc<dyn IdentityResolver>,
    inventory: Arc<dyn InventoryReporter>,
) {
    let stale_interval = configuration.stale_sweep_interval();
    if !stale_interval.is_zero() {
        let sweeper = Arc::new(StaleSweeper::new(
            store.clone(),
            resolver.clone(),
            inventory,
            configuration.inventory_stale_offset(),
            configuration.stale_sweep_chunk(),
        ));
        tokio::spawn(sweeper::run_periodically(
            "stale",
            stale_interval,
            shutdown.subscribe(),
            move || {
                let sweeper = sweeper.clone();
                async move {
                    if let Err(e) = sweeper.run_once().await {
                        error!("Staleness sweep failed: {}", e);
                    }
                }
            },
        ));
    }

    let tenantless_interval = configuration.tenantless_sweep_interval();
    if !tenantless_interval.is_zero() {
        let sweeper = Arc::new(TenantlessSweeper::new(
            store.clone(),
            resolver,
            configuration.tenant_retry_interval(),
            configuration.tenant_lookup_failure_ceiling(),
            configuration.tenantless_sweep_chunk(),
        ));
        tokio::spawn(sweeper::run_periodically(
            "tenantless",
            tenantless_interval,
            shutdown.subscribe(),
            move || {
                let sweeper = sweeper.clone();
                async move {
                    if let Err(e) = sweeper.run_once().await {
                        error!("Tenantless sweep failed: {}", e);
                    }
                }
            },
        ));
    }

    let retention_interval = configuration.retention_sweep_interval();
    if !retention_interval.is_zero() {
        let sweeper = Arc::new(RetentionSweeper::new(
            store,
            configuration.retention_max_age(),
        ));
        tokio::spawn(sweeper::run_periodically(
            "retention",
            retention_interval,
            shutdown.subscribe(),
            move || {
                let sweeper = sweeper.clone();
                async move {
                    if let Err(e) = sweeper.run_once().await {
                        error!("Retention sweep failed: {}", e);
                    }
                }
            },
        ));
    }
}
