//! Live change notifications across a user's sessions.
//!
//! - [`notifier`]: the per-user, per-session sink registry and broadcast
//! - [`subscription`]: one subscriber stream from registration to release
//! - [`protocol`]: the event and its wire form

pub mod notifier;
pub mod protocol;
pub mod subscription;

pub use notifier::{ChangeNotifier, ChannelSink, NotificationSink, RegistrationId, SinkError};
pub use protocol::{ChangeEvent, ChangeNotice, ResourceKind};
pub use subscription::{serve_subscription, EventWriter, SubscriptionEnd};
