use clap::Parser;
use youtube_mqtt_monitor::config::GenericArgs;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = match GenericArgs::try_parse() {
        Ok(args) => args,
        // --help and --version exit cleanly, anything else is a configuration error
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
        "starting YouTube subscriber monitor"
    );
    youtube_mqtt_monitor::run(settings).await
}
