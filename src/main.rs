use clap::Parser;
use museum_catalog::{
    CliArgs, LoggingConfig, ProgressEvent, ProgressSink, RunConfig, init_logging,
    load_api_key, run_catalog, shutdown_telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logging_config = LoggingConfig::from_env();
    let _guard = init_logging(logging_config)?;

    let cli = CliArgs::parse();
    let config = RunConfig::from_args(cli)?;

    // Fail before any request when paths or credentials are unusable
    config.validate()?;
    let api_key = load_api_key()?;

    let (progress, mut events) = ProgressSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let finished = event == ProgressEvent::Finished;
            println!("{event}");
            if finished {
                break;
            }
        }
    });

    let result = run_catalog(config, api_key, progress).await;
    let _ = printer.await;

    shutdown_telemetry();

    let summary = result?;
    println!("{summary}");
    Ok(())
}
