use std::{sync::Arc, thread};

use dotenv::dotenv;
use log::{LevelFilter, error, info};
use permwatch::{
    Monitor, ScrapingContext, Scheduler,
    scheduler::read_manual_triggers,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

extern crate env_logger;
extern crate log;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let context = ScrapingContext::new()?;
    info!(
        "watching {} via {} every {} min, archiving daily at {}",
        context.config.target_url,
        context.fetcher.fetch_url(),
        context.config.refresh_interval.as_secs() / 60,
        context.config.archive_time.format("%H:%M")
    );

    let ScrapingContext {
        config,
        fetcher,
        history,
    } = context;
    let monitor = Arc::new(Monitor::new(fetcher, history));
    let scheduler = Scheduler::new(monitor, &config);

    let cancel = CancellationToken::new();
    let (trigger_tx, trigger_rx) = mpsc::channel(4);

    // Type a line to refresh now, `q` to quit.
    let stdin_cancel = cancel.clone();
    thread::spawn(move || {
        read_manual_triggers(std::io::stdin().lock(), trigger_tx, stdin_cancel);
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("could not listen for ctrl-c: {e}");
            return;
        }
        signal_cancel.cancel();
    });

    scheduler.run(trigger_rx, cancel).await;
    Ok(())
}
