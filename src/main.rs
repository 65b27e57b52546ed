use clap::Parser;
use log::{error, info};
use search_console_mqtt::search_console::{Credentials, SearchConsole};
use search_console_mqtt::{Configuration, MqttSession, Options, Result, Runner};

const DEFAULT_CONFIG_PATH: &str = "search-console-mqtt.toml";
const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";

/// Send Search Console clicks and impressions to MQTT
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Don't send sensor config data
    #[arg(long)]
    noconfig: bool,

    /// Remove sensors, don't send data
    #[arg(long)]
    remove: bool,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Add data from 7 days ago
    #[arg(long)]
    add7: bool,

    /// OAuth credentials of an authorized user
    #[arg(long, default_value = DEFAULT_CREDENTIALS_PATH)]
    credentials: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match Configuration::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    config.ensure_defaults();

    stderrlog::new()
        .module(module_path!())
        .verbosity(config.log_verbosity())
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .expect("Failed to initialize logging");

    if let Err(e) = run(&args, &mut config).await {
        error!("Run failed: {e}");
        std::process::exit(1);
    }
}

async fn run(args: &Args, config: &mut Configuration) -> Result<()> {
    info!("{} started", env!("CARGO_PKG_NAME"));
    config.save(&args.config)?;

    let credentials = Credentials::load(&args.credentials)?;
    let reporting = SearchConsole::authenticate(&credentials).await?;

    let options = Options {
        announce: !args.noconfig,
        add7: args.add7,
        remove: args.remove,
    };
    let mut runner = Runner::new(config, &args.config, options);
    runner.ensure_sites(&reporting).await?;

    let mut session = MqttSession::connect(&runner.mqtt()).await?;
    runner.run(&reporting, &mut session).await?;
    session.close().await?;

    info!("{} done", env!("CARGO_PKG_NAME"));
    Ok(())
}
