use ::sparkwatch_common::{
    config::{read_config, Args},
    error::{Result, SparkwatchError},
    tracing::info,
    tracing_subscriber,
};
use ::sparkwatch_monitor::{config::MonitorConfig, ClusterMonitor};

#[tokio::main]
/// Run the leak reaper as a standalone background service.
async fn main() -> Result<()> {
    // setup tracing
    tracing_subscriber::fmt::init();
    let args = Args::parse_args();
    let config: MonitorConfig = read_config(&args.config_path)?;
    info!("Start sparkwatch monitor");

    let monitor = ClusterMonitor::init(config).await?;
    tokio::signal::ctrl_c()
        .await
        .map_err(SparkwatchError::other)?;
    info!("Shutting down");
    monitor.shutdown().await;
    Ok(())
}
