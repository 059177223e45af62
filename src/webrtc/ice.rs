//! ICE candidate collection
//!
//! Gathered candidates are carried inside the offer as `a=` attribute lines
//! instead of being trickled, so the offer is only sent once gathering is
//! complete.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace};

use super::connection::IceCandidateHandler;
use crate::error::{AppError, Result};

/// Format a candidate as an SDP attribute line
pub fn candidate_line(candidate: &str) -> String {
    format!("a={}\r\n", candidate)
}

/// Base offer SDP followed by the candidate lines, in discovery order
pub fn assemble_offer(base_sdp: &str, lines: &[String]) -> String {
    let mut offer = String::with_capacity(base_sdp.len() + lines.iter().map(String::len).sum::<usize>());
    offer.push_str(base_sdp);
    for line in lines {
        offer.push_str(line);
    }
    offer
}

#[derive(Default)]
struct CollectorState {
    lines: Vec<String>,
    frozen: bool,
}

/// Accumulates candidate lines until the end-of-candidates notification
pub struct CandidateCollector {
    state: Arc<Mutex<CollectorState>>,
    complete_tx: Arc<watch::Sender<bool>>,
    complete_rx: watch::Receiver<bool>,
}

impl CandidateCollector {
    pub fn new() -> Self {
        let (complete_tx, complete_rx) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(CollectorState::default())),
            complete_tx: Arc::new(complete_tx),
            complete_rx,
        }
    }

    /// Handler to register on the connection's candidate events
    pub fn handler(&self) -> IceCandidateHandler {
        let state = self.state.clone();
        let complete = self.complete_tx.clone();
        Box::new(move |candidate: Option<String>| match candidate {
            Some(candidate) => {
                if candidate.is_empty() {
                    return;
                }
                let mut state = state.lock();
                if state.frozen {
                    debug!("Ignoring ICE candidate after offer was sent: {}", candidate);
                    return;
                }
                trace!("ICE candidate: {}", candidate);
                state.lines.push(candidate_line(&candidate));
            }
            None => {
                // send_if_modified keeps the completion signal to a single edge
                let fired = complete.send_if_modified(|done| !std::mem::replace(done, true));
                if fired {
                    debug!("ICE gathering complete");
                }
            }
        })
    }

    /// Wait for the end-of-candidates notification
    pub async fn wait_complete(&self, timeout: Option<Duration>) -> Result<()> {
        let mut rx = self.complete_rx.clone();
        let wait = async move {
            rx.wait_for(|done| *done)
                .await
                .map(|_| ())
                .map_err(|_| AppError::WebRtcError("ICE candidate source dropped".to_string()))
        };
        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                AppError::Timeout(format!("ICE gathering did not complete within {:?}", limit))
            })?,
            None => wait.await,
        }
    }

    pub fn is_complete(&self) -> bool {
        *self.complete_rx.borrow()
    }

    /// Freeze the sequence and return it. Later candidates are dropped.
    pub fn freeze(&self) -> Vec<String> {
        let mut state = self.state.lock();
        state.frozen = true;
        state.lines.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.state.lock().frozen
    }

    /// Snapshot of the lines gathered so far
    pub fn lines(&self) -> Vec<String> {
        self.state.lock().lines.clone()
    }
}

impl Default for CandidateCollector {
    fn default() -> Self {
        Self::new()
    }
}
