mod cli;

use anyhow::anyhow;
use log::info;
use meter_sync::{Config, MemoryView, MeterController, MeterView, Slots, TerminalView};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main(flavor = "current_thread")] // meters and countdowns share one thread
async fn main() -> anyhow::Result<()> {
    let cmd = cli::build_cli();
    let matches = cmd.get_matches();
    let log_level = matches.get_one::<String>("log-level").cloned();
    let version_flag = matches.get_flag("version");

    cli::init_logging(log_level.as_deref());

    if version_flag {
        println!("meter-sync {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut cfg = Config::from_env().map_err(|e| anyhow!(e))?;
    if let Some(base) = matches.get_one::<String>("base-url") {
        cfg.set_base_url(base).map_err(|e| anyhow!(e))?;
    }
    if let Some(secs) = matches.get_one::<u64>("interval") {
        cfg.poll_interval = Duration::from_secs(*secs);
    }
    let slots = Slots {
        badges: cfg.show_usage,
        countdowns: cfg.show_timer,
    };

    if matches.get_flag("once") {
        let view = Arc::new(MemoryView::with_slots(slots));
        let mut controller = MeterController::new(&cfg, view.clone())?;
        let mode = controller.sync_once().await;
        info!("synced once; mode={:?}", mode);
        println!("{}", serde_json::to_string_pretty(&view.snapshot())?);
        return Ok(());
    }

    let view: Arc<dyn MeterView> = Arc::new(TerminalView::with_slots(slots));
    let controller = MeterController::new(&cfg, view)?;
    tokio::select! {
        res = controller.run() => res,
        _ = tokio::signal::ctrl_c() => {
            println!();
            info!("interrupted; stopping");
            Ok(())
        }
    }
}
