use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::Backend;
use crate::session::{Session, SessionStatus};

/// Session shared between the caller, feeder threads and the console.
pub type SharedSession<B> = Arc<Mutex<Session<B>>>;

/// Move a session behind a shared handle.
pub fn share<B: Backend>(session: Session<B>) -> SharedSession<B> {
    Arc::new(Mutex::new(session))
}

/// Fetch the current status snapshot.
pub fn get_status<B: Backend>(session: &SharedSession<B>) -> SessionStatus {
    session.lock().status()
}
