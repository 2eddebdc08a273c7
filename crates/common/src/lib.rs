pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod notify;
pub mod types;

pub use config::{AlertSink, Config};
pub use connector::{Connector, ConnectorStream};
pub use error::{Error, Result};
pub use events::{ErrorStream, Observer, ObserverId};
pub use notify::{Alert, ChannelNotifier, NoopNotifier, Notifier, TracingNotifier};
pub use types::*;
