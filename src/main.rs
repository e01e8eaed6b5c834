use log::{error, info};
use power_meter::{
    modbus::ModbusRtuBus,
    network::{status::StatusBroadcaster, udp::UdpLink, SystemClock},
    Config, PollManager, PowerMeter, TelemetryCodec,
};
use rand::{rngs::StdRng, SeedableRng};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    let default_filter = std::env::var("PM_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let keys = match config.telemetry.keys() {
        Ok(keys) => keys,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let link = match UdpLink::new(&config.telemetry.host, config.telemetry.port, config.telemetry.bind_port).await {
        Ok(link) => link,
        Err(e) => {
            error!("Unable to open telemetry link to {}: {}", config.telemetry.host, e);
            std::process::exit(1);
        }
    };
    info!("Sending telemetry to {}", link.remote());

    let bus = ModbusRtuBus::connect(&config.bus, config.meter.address);
    let meter = PowerMeter::from_config(&config.meter);
    let codec = TelemetryCodec::new(keys, StdRng::from_entropy());

    let mut poller = PollManager::new(meter, bus, codec, link, SystemClock::new())
        .with_energy_reset(config.meter.reset_energy_on_start);

    if config.status.enabled {
        match StatusBroadcaster::new(config.status.group, config.status.port, config.status.ttl).await {
            Ok(status) => poller = poller.with_status(status),
            Err(e) => error!("Unable to open status broadcaster: {}", e),
        }
    }

    poller.start_thread().await;
}
