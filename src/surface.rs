//! The rendering-surface seam.
//!
//! A [`Surface`] is whatever hosts page script: a platform web view in a
//! real embedding, or [`HeadlessSurface`] which emulates the page side in
//! Rust. All methods run on the UI thread.

mod headless;

pub use headless::{HeadlessSurface, ScriptEvaluator, WindowMessage};

use crate::receiver::BridgeReceiver;
use crate::script::Script;
use crate::ui::UiContext;

pub trait Surface: Send + Sync {
    /// Evaluate `script` in the main frame of the current document.
    fn evaluate(&self, ui: &UiContext, script: Script);

    /// URL of the current main document, if any.
    fn url(&self, ui: &UiContext) -> Option<String>;

    /// Route page message bodies to `receiver`.
    ///
    /// Engines register their script-message handler here; the handler calls
    /// [`BridgeReceiver::on_script_message`] from the script thread.
    fn attach_receiver(&self, receiver: BridgeReceiver);
}
