pub mod client;
pub mod dispatch;
pub mod drag;
pub mod host;
pub mod logging;
pub mod mount;
pub mod position;
pub mod settings;
pub mod status;
pub mod view;
pub mod widget;
pub mod worker;

use crate::client::HttpTransport;
use crate::position::KeyValueStore;
use crate::settings::WidgetSettings;
use crate::widget::{ControlWidget, Setup, WidgetHost};
use std::sync::Arc;

/// Entry point for the host's extension registration: initialise logging,
/// connect to the control service and set the widget up.
///
/// The widget starts floating and moves into the host's own controls once
/// the background location search finds them.
pub fn install<H, S>(host: H, store: S, settings: WidgetSettings) -> anyhow::Result<Setup<H, S>>
where
    H: WidgetHost,
    S: KeyValueStore,
{
    logging::init(settings.debug_logging, settings.log_file.clone());
    let transport = HttpTransport::new(&settings.base_url, settings.http_timeout())?;
    ControlWidget::setup(host, store, Arc::new(transport), settings)
}
