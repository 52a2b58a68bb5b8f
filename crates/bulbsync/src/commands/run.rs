//! `bulbsync run`: the translator daemon.
//!
//! Wires the HTTP hub channel, the device proxy client and the bus stream
//! into a `Bridge`, then pumps bus messages until Ctrl-C.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bulbsync_api::{BusHandle, HttpDeviceClient, HttpHubChannel, ReconnectConfig};
use bulbsync_config::{Config, load_thing_config};
use bulbsync_core::Bridge;

use crate::cli::GlobalOpts;
use crate::commands::util;
use crate::error::CliError;

pub async fn handle(config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let bridge_config = config.bridge_config()?;
    let table = util::load_mapping(global, config)?;

    let transport = config.transport();
    let hub = HttpHubChannel::new(config.hub_url()?, &transport)?;
    let devices = HttpDeviceClient::new(config.device_url()?, &transport)?;
    let bus_url = config.bus_url()?;

    let thing = load_thing_config(&config.storage_path, &config.defaults_path)?;
    thing.validate()?;
    debug!(
        keys = thing.config.len(),
        rules = thing.validation.len(),
        "thing config validated"
    );

    let translator_id = bridge_config.translator_id.clone();
    let bridge = Bridge::new(bridge_config, hub, devices, table);

    let cancel = CancellationToken::new();
    let bus = BusHandle::connect(bus_url, ReconnectConfig::default(), cancel.child_token());

    info!(%translator_id, "starting translator");
    let pump = {
        let bridge = bridge.clone();
        let messages = bus.subscribe();
        let replier = bus.replier();
        let cancel = cancel.clone();
        tokio::spawn(async move { bridge.serve(messages, replier, cancel).await })
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CliError::Internal(format!("cannot listen for shutdown signal: {e}")))?;

    info!(%translator_id, "shutting down");
    cancel.cancel();
    bus.shutdown();
    if let Err(e) = pump.await {
        warn!(error = %e, "message pump ended abnormally");
    }
    Ok(())
}
