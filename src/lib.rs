pub mod bootstrap;
pub mod config;
pub mod error;
pub mod host;
pub mod interception;
pub mod page;
pub mod ports;
pub mod protocol;
pub mod receiver;
pub mod script;
pub mod surface;
pub mod ui;
pub mod webview;

pub use config::BridgeSettings;
pub use error::{BridgeError, BridgeResult};
pub use host::{HandlerTable, HostChannel, HostMessenger, HostMethod};
pub use protocol::{HostError, HostReply, ResourceRequest, ResourceResponse};
pub use surface::{HeadlessSurface, Surface};
pub use ui::{OffUiThread, UiContext, UiHandle, UiLoop};

// Re-export the main entry point
pub use webview::WebViewBridge;
