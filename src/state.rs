use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::acquisition::AcquisitionSession;
use crate::params::{DetectorStatus, ParamStore};

/// Everything the control thread and the frame callback share.
#[derive(Debug, Default)]
pub struct DriverState {
    pub params: ParamStore,
    pub session: AcquisitionSession,
}

pub type SharedState = Arc<Mutex<DriverState>>;

pub fn new_shared(state: DriverState) -> SharedState {
    Arc::new(Mutex::new(state))
}

/// Lock the shared state. A poisoned lock is taken over as is.
pub fn lock(state: &SharedState) -> MutexGuard<'_, DriverState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DriverState {
    /// Log `err` and surface it in the status message.
    pub fn report_error(&mut self, context: &str, err: &dyn std::fmt::Display) {
        tracing::error!("{}: {}", context, err);
        self.params.set_status(&format!("Error: {err}"));
        self.params.set_detector_status(DetectorStatus::Error);
    }
}
