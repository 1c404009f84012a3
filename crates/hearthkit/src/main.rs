use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hearthkit::hub::client::RumqttcClient;
use hearthkit::hub::MqttHub;
use hearthkit::Bridge;
use hearthkit::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Expose hub entities as remote-controllable accessories
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "hearthkit.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("hearthkit starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let client = RumqttcClient::new(&config.mqtt)?;
    let (hub, mut driver) = MqttHub::new(client, &config.mqtt.topic_prefix);
    driver
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("connecting to MQTT broker {}", config.mqtt.broker))?;

    let bridge = Arc::new(Bridge::new(
        config.bridge.name.clone(),
        hub,
        &config.accessories,
    ));
    tracing::info!(
        "Bridge \"{}\" exposing {} entities",
        bridge.name(),
        config.accessories.len()
    );

    let (api_shutdown_tx, api_shutdown_rx) = tokio::sync::oneshot::channel();
    let api_handle = config.api.clone().map(|api| {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            if let Err(e) = hearthkit::api::serve(api.listen, api.port, bridge, api_shutdown_rx).await {
                tracing::error!("HTTP API server error: {}", e);
            }
        })
    });

    tokio::select! {
        _ = driver.run(&bridge) => {
            tracing::warn!("Hub connection closed");
        }
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        },
    }

    let _ = api_shutdown_tx.send(());
    if let Some(handle) = api_handle {
        let _ = handle.await;
    }

    tracing::info!("hearthkit shutdown complete");
    Ok(())
}
