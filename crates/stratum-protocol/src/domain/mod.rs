//! Domain layer: wire messages, connection state, call correlation and
//! subscription queues.

pub mod errors;
pub mod message;
pub mod methods;
pub mod pending;
pub mod state;
pub mod subscriptions;

pub use errors::ClientError;
pub use message::{ResponseFuture, StratumMessage};
pub use pending::{PendingCalls, PendingStats};
pub use state::ConnectionState;
pub use subscriptions::{Subscription, SubscriptionRegistry, SubscriptionStream};
