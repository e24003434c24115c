use clap::Parser;
use youtube_mqtt_monitor::config::HomeAssistantArgs;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = match HomeAssistantArgs::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };
    let settings = args.into_settings()?;
    youtube_mqtt_monitor::init_tracing(settings.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        channels = settings.channels.len(),
        "starting YouTube monitor for Home Assistant"
    );
    youtube_mqtt_monitor::run(settings).await
}
