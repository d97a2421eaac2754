//! Bounded queue for beacon-delivered events.
//!
//! Exit beacons must return immediately and never fail, so their processing
//! happens off the request path. The queue is explicitly bounded: when it is
//! saturated, jobs are dropped with a warning instead of piling up, and on
//! shutdown the worker drains whatever is left before exiting.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{EventRecorder, TrackEventParams};

/// Handle for submitting beacon events to the background worker.
#[derive(Clone)]
pub struct BeaconQueue {
    tx: mpsc::Sender<TrackEventParams>,
}

impl BeaconQueue {
    /// Spawn the worker task and return the queue handle plus the worker's
    /// join handle. Dropping every queue clone closes the channel; the
    /// worker drains remaining jobs and exits.
    pub fn spawn(recorder: EventRecorder, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<TrackEventParams>(capacity);

        let handle = tokio::spawn(async move {
            while let Some(params) = rx.recv().await {
                if let Err(e) = recorder.record(params).await {
                    warn!(error = %e, "Beacon event processing failed");
                }
            }
            debug!("Beacon queue drained, worker exiting");
        });

        (Self { tx }, handle)
    }

    /// Enqueue a beacon event, dropping it if the queue is saturated.
    pub fn submit(&self, params: TrackEventParams) {
        match self.tx.try_send(params) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Beacon queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Beacon queue closed, dropping event");
            }
        }
    }
}
