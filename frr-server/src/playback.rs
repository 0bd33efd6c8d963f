//! Playback clock task
//!
//! One tokio task per playing session. It is started when playback begins
//! and torn down (via its `CancellationToken`) on pause, end of data, a new
//! load, or unload. Each tick measures the real time elapsed since the
//! previous one, so a stalled runtime simply produces a larger delta.

use crate::state::AppState;
use frr_core::Tick;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Start (or restart) the clock task for the current session
pub async fn start(state: &AppState) {
    let token = CancellationToken::new();
    {
        let mut cancel = state.playback_cancel.write().await;
        if let Some(previous) = cancel.replace(token.clone()) {
            previous.cancel();
        }
    }

    let state = state.clone();
    tokio::spawn(async move {
        run(state, token).await;
    });
}

/// Cancel the clock task, if one is running
pub async fn stop(state: &AppState) {
    let mut cancel = state.playback_cancel.write().await;
    if let Some(token) = cancel.take() {
        token.cancel();
    }
}

async fn run(state: AppState, token: CancellationToken) {
    info!("Playback task started");

    let mut interval = tokio::time::interval(state.config.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let now = Instant::now();
        let delta = now.duration_since(last).as_secs_f64();
        last = now;

        let (tick, playing, snapshot) = {
            let mut session = state.session.write().await;
            let tick = session.tick(delta);
            let snapshot = match tick {
                Tick::Advanced { frame_changed: true } | Tick::Finished => Some(session.snapshot()),
                _ => None,
            };
            (tick, session.is_playing(), snapshot)
        };

        if let Some(snapshot) = snapshot {
            let _ = state.updates_tx.send(snapshot);
        }

        if tick == Tick::Finished {
            debug!("Reached end of data");
            break;
        }
        if !playing {
            break;
        }
    }

    info!("Playback task ended");
}
