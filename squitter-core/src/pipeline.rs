//! Decode worker pool, prune sweep and shutdown.
//!
//! Frames go into one bounded queue shared by N workers. Workers decode in
//! parallel, then take the aircraft's lock in the order the frames left the
//! queue: each frame waits until the one before it holds its aircraft's lock.
//! Two frames for one ICAO are therefore applied in arrival order even when
//! they land on different workers, while different aircraft update in
//! parallel.
//!
//! Events go out on a bounded channel. A full channel blocks the workers
//! (logged at `warn`), so the consumer must keep draining it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::input::InputFrame;
use crate::tracker::{TrackEvent, Tracker, TrackerStats};
use crate::types::{AdsbError, Result};

/// Queue end shared by the workers, plus the claim token of the frame most
/// recently taken from it.
struct Intake {
    frames: mpsc::Receiver<InputFrame>,
    last_claim: Option<oneshot::Receiver<()>>,
}

/// Running worker pool around a [`Tracker`].
pub struct Pipeline {
    tracker: Arc<Tracker>,
    input: mpsc::Sender<InputFrame>,
    stop: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    sweeper: JoinHandle<()>,
}

impl Pipeline {
    /// Spawn the workers and the prune sweep.
    ///
    /// Must be called inside a tokio runtime. Returns the pipeline and the
    /// receiving end of the event queue.
    pub fn start(
        tracker: Arc<Tracker>,
        config: &PipelineConfig,
        prune_every: Duration,
    ) -> (Pipeline, mpsc::Receiver<TrackEvent>) {
        let (input, frames) = mpsc::channel(config.queue_size.max(1));
        let (events, event_rx) = mpsc::channel(config.event_queue_size.max(1));
        let (stop, stop_rx) = watch::channel(false);

        let intake = Arc::new(Mutex::new(Intake {
            frames,
            last_claim: None,
        }));

        let worker_count = config.workers.max(1);
        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&intake),
                    Arc::clone(&tracker),
                    events.clone(),
                ))
            })
            .collect();

        let sweeper = tokio::spawn(run_sweeper(
            Arc::clone(&tracker),
            prune_every,
            events,
            stop_rx,
        ));

        info!(
            workers = worker_count,
            queue_size = config.queue_size,
            prune_every_secs = prune_every.as_secs_f64(),
            "pipeline started"
        );

        let pipeline = Pipeline {
            tracker,
            input,
            stop,
            workers,
            sweeper,
        };
        (pipeline, event_rx)
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// Queue a frame, waiting while the queue is full.
    pub async fn submit(&self, frame: InputFrame) -> Result<()> {
        if *self.stop.borrow() {
            return Err(closed("pipeline is shutting down"));
        }
        self.input
            .send(frame)
            .await
            .map_err(|_| closed("pipeline workers have stopped"))
    }

    /// Queue a frame without waiting. Returns `false` if the queue is full
    /// or closed and the frame was dropped.
    pub fn try_submit(&self, frame: InputFrame) -> bool {
        if *self.stop.borrow() {
            return false;
        }
        match self.input.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("input queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Stop admitting frames, let the workers drain what is queued, stop the
    /// sweep and wait for every task.
    ///
    /// The event channel closes once this returns.
    pub async fn shutdown(self) -> TrackerStats {
        let Pipeline {
            tracker,
            input,
            stop,
            workers,
            sweeper,
        } = self;

        let _ = stop.send(true);
        // Workers exit when the queue is closed and empty.
        drop(input);

        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker task failed");
            }
        }
        if let Err(e) = sweeper.await {
            warn!(error = %e, "sweep task failed");
        }

        let stats = tracker.stats();
        info!(
            frames = stats.frames_received,
            decoded = stats.frames_decoded,
            dropped = stats.frames_dropped,
            aircraft = stats.aircraft,
            "pipeline stopped"
        );
        stats
    }
}

fn closed(reason: &str) -> AdsbError {
    AdsbError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, reason))
}

async fn run_worker(
    id: usize,
    intake: Arc<Mutex<Intake>>,
    tracker: Arc<Tracker>,
    events: mpsc::Sender<TrackEvent>,
) {
    loop {
        let (frame, previous, claimed) = {
            let mut intake = intake.lock().await;
            let Some(frame) = intake.frames.recv().await else {
                break;
            };
            let (claimed, claim) = oneshot::channel();
            let previous = intake.last_claim.replace(claim);
            (frame, previous, claimed)
        };

        let update = tracker.decode_input(&frame);

        // A dropped sender also releases us, so failed decodes never stall
        // the frames behind them.
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        let Some(update) = update else {
            continue;
        };
        let out = tracker.apply_update(&update, move || {
            let _ = claimed.send(());
        });
        for event in out {
            if emit(&events, event).await.is_err() {
                debug!(worker = id, "event consumer gone");
            }
        }
    }
    debug!(worker = id, "worker stopped");
}

async fn run_sweeper(
    tracker: Arc<Tracker>,
    every: Duration,
    events: mpsc::Sender<TrackEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let every = every.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for event in tracker.prune(tracker.clock()) {
                    if emit(&events, event).await.is_err() {
                        debug!("event consumer gone");
                    }
                }
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
    debug!("sweep stopped");
}

/// Send one event, warning when the consumer is falling behind.
async fn emit(
    events: &mpsc::Sender<TrackEvent>,
    event: TrackEvent,
) -> std::result::Result<(), mpsc::error::SendError<TrackEvent>> {
    match events.try_send(event) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!(
                capacity = events.max_capacity(),
                "event queue full, waiting for consumer"
            );
            events.send(event).await
        }
        Err(mpsc::error::TrySendError::Closed(event)) => {
            Err(mpsc::error::SendError(event))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;

    fn small_config(workers: usize) -> PipelineConfig {
        PipelineConfig {
            workers,
            queue_size: 16,
            event_queue_size: 1000,
        }
    }

    async fn collect(mut rx: mpsc::Receiver<TrackEvent>) -> Vec<TrackEvent> {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_pipeline_decodes_and_drains_on_shutdown() {
        let tracker = Arc::new(Tracker::default());
        let (pipeline, rx) = Pipeline::start(
            Arc::clone(&tracker),
            &small_config(4),
            Duration::from_secs(3600),
        );

        let lines = [
            "*8D4840D6202CC371C32CE0576098;",
            "*8D406B902015A678D4D220AA4BDA;",
            "*8D485020994409940838175B284F;",
            "*00000000000000;",
            "garbage",
        ];
        for (i, line) in lines.iter().enumerate() {
            pipeline
                .submit(InputFrame::from_line(line, i as f64 + 1.0))
                .await
                .unwrap();
        }

        let stats = pipeline.shutdown().await;
        assert_eq!(stats.frames_received, 5, "every queued frame is processed");
        assert_eq!(stats.frames_decoded, 3);
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.aircraft, 3);

        let events = collect(rx).await;
        let new_aircraft = events
            .iter()
            .filter(|e| matches!(e, TrackEvent::NewAircraft { .. }))
            .count();
        assert_eq!(new_aircraft, 3, "one NewAircraft per ICAO: {events:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pairs_resolve_across_workers() {
        let tracker = Arc::new(Tracker::default());
        let (pipeline, rx) = Pipeline::start(
            Arc::clone(&tracker),
            &small_config(8),
            Duration::from_secs(3600),
        );
        let drain = tokio::spawn(collect(rx));

        // Even then odd, repeated: every second frame completes a pair
        for i in 0..20 {
            let line = if i % 2 == 0 {
                "8D40621D58C382D690C8AC2863A7"
            } else {
                "8D40621D58C386435CC412692AD6"
            };
            pipeline
                .submit(InputFrame::from_line(line, 1.0 + i as f64))
                .await
                .unwrap();
        }

        let stats = pipeline.shutdown().await;
        drain.await.unwrap();
        assert_eq!(stats.frames_decoded, 20);
        assert_eq!(
            stats.positions_resolved, 10,
            "arrival order must survive parallel decoding"
        );

        let history = tracker.history(&[0x40, 0x62, 0x1D]).unwrap();
        assert_eq!(history.len(), 10);
        assert!(
            history.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
            "positions recorded in arrival order"
        );
        // Odd sample is always the later one
        let last = history.last().unwrap();
        assert!((last.lat - 52.265780).abs() < 1e-6, "lat {}", last.lat);
    }

    #[tokio::test]
    async fn test_sweep_prunes_silent_aircraft() {
        let tracker = Arc::new(Tracker::new(TrackerConfig::default(), None));
        let (pipeline, mut rx) = Pipeline::start(
            Arc::clone(&tracker),
            &small_config(1),
            Duration::from_millis(20),
        );

        // Replayed capture: KLM goes silent 399 s before the last frame
        pipeline
            .submit(InputFrame::from_line("8D4840D6202CC371C32CE0576098", 1.0))
            .await
            .unwrap();
        pipeline
            .submit(InputFrame::from_line("8D406B902015A678D4D220AA4BDA", 400.0))
            .await
            .unwrap();

        let removed = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = rx.recv().await {
                if let TrackEvent::Removed { aircraft } = event {
                    return Some(aircraft);
                }
            }
            None
        })
        .await
        .expect("sweep should run within the timeout")
        .expect("aircraft should be removed");

        assert_eq!(removed.callsign.as_deref(), Some("KLM1023"));
        assert_eq!(tracker.len(), 1, "EZY is recent on the capture's timeline");
        assert!(tracker.get(&[0x40, 0x6B, 0x90]).is_some());
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_stop_signal_fails() {
        let tracker = Arc::new(Tracker::default());
        let (pipeline, _rx) = Pipeline::start(tracker, &small_config(1), Duration::from_secs(60));
        let _ = pipeline.stop.send(true);

        let err = pipeline
            .submit(InputFrame::from_line("8D4840D6202CC371C32CE0576098", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AdsbError::Io(_)), "got {err}");
        assert!(!pipeline.try_submit(InputFrame::from_line("8D4840D6202CC371C32CE0576098", 1.0)));
        pipeline.shutdown().await;
    }
}
