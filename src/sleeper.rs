use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::{Builder, Runtime};
use tokio::signal::unix::{signal, Signal, SignalKind};

use util::format_duration;

/// The main loop's idle wait. A SIGHUP (e.g. after editing the config or
/// dropping in a sample sheet) ends it early.
pub struct Sleeper {
    runtime: Runtime,
    hangup: Signal,
}

/// Why a sleep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Timeout,
    Hangup,
}

impl Sleeper {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("starting signal runtime")?;
        // signal handlers need a running reactor:
        let hangup = runtime
            .block_on(async { signal(SignalKind::hangup()) })
            .context("installing SIGHUP handler")?;
        Ok(Self { runtime, hangup })
    }

    pub fn sleep(&mut self, duration: Duration) -> Wake {
        let Self { runtime, hangup } = self;
        log::info!("sleeping for {}", format_duration(duration));
        runtime.block_on(async {
            tokio::select! {
                _ = tokio::time::sleep(duration) => Wake::Timeout,
                _ = hangup.recv() => {
                    log::info!("SIGHUP received; scanning now");
                    Wake::Hangup
                }
            }
        })
    }
}
