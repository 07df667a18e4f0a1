use std::sync::Arc;

use quiver_file::Session;

/// Codec registry and default write options shared by writers and readers.
///
/// A session should be created once and reused for every file the process touches.
#[allow(non_camel_case_types)]
pub struct quiver_session {
    pub(crate) inner: Arc<Session>,
}

impl quiver_session {
    /// The session behind `session`, or a fresh default session when it is NULL.
    pub(crate) unsafe fn resolve(session: *const quiver_session) -> Arc<Session> {
        match unsafe { session.as_ref() } {
            Some(session) => Arc::clone(&session.inner),
            None => Arc::new(Session::default()),
        }
    }
}

/// Create a session with all built-in codecs and default write options.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_session_create() -> *mut quiver_session {
    Box::into_raw(Box::new(quiver_session {
        inner: Arc::new(Session::default()),
    }))
}

/// Free a session. Writers and readers opened with it keep their own reference.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn quiver_session_free(session: *mut quiver_session) {
    if !session.is_null() {
        drop(unsafe { Box::from_raw(session) })
    }
}
