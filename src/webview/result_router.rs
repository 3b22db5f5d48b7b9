//! Routing for script-evaluation results.
//!
//! `evaluate_javascript` and `call_async_javascript` register a callback
//! under a fresh result id before evaluating. The page reports back through
//! an intercepted handler name carrying that id, and the receiver calls
//! `complete()`, which removes the entry and runs the callback once.
//!
//! Entries are dropped, never called, when the surface is disposed.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use ulid::Ulid;

use crate::error::LockResultExt;
use crate::ui::UiContext;

/// Value of the evaluated script, or the page-side error text.
pub type ScriptResult = Result<Value, String>;

/// Callback for one script evaluation. Runs on the UI thread.
pub type ScriptCallback = Box<dyn FnOnce(&UiContext, ScriptResult) + Send>;

pub(crate) struct ResultRouter {
    pending: Mutex<HashMap<String, ScriptCallback>>,
}

impl ResultRouter {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Store `callback` and return the id the page must report under.
    pub(crate) fn register(&self, callback: ScriptCallback) -> String {
        let id = Ulid::new().to_string();
        self.pending
            .lock()
            .recover_poison("ResultRouter::register")
            .insert(id.clone(), callback);
        id
    }

    /// Run and remove the callback for `id`. Returns `false` for unknown ids.
    pub(crate) fn complete(&self, ui: &UiContext, id: &str, result: ScriptResult) -> bool {
        // The lock is released before the callback runs; it may register again.
        let callback = self
            .pending
            .lock()
            .recover_poison("ResultRouter::complete")
            .remove(id);
        match callback {
            Some(callback) => {
                callback(ui, result);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.lock().recover_poison("ResultRouter::len").len()
    }

    /// Abandon every pending callback. Returns how many were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut pending = self.pending.lock().recover_poison("ResultRouter::clear");
        let count = pending.len();
        pending.clear();
        count
    }
}
