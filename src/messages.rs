//! # Messages
//!
//! Marker traits for the two message shapes the dispatcher understands, plus the
//! type identities used as registry keys.
//!
//! - A [`Request`] expects exactly one typed response from exactly one handler.
//! - A [`Notification`] has no response and fans out to zero or more handlers.
//!
//! ```rust
//! use mediator_core::{Notification, Request};
//!
//! struct Ping {
//!     message: String,
//! }
//!
//! struct Pong {
//!     message: String,
//! }
//!
//! impl Request for Ping {
//!     type Response = Pong;
//! }
//!
//! #[derive(Clone)]
//! struct StateChanged {
//!     state: String,
//! }
//!
//! impl Notification for StateChanged {}
//! ```

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A message answered by a single handler with a `Response`.
pub trait Request: Send + 'static {
    type Response: Send + 'static;
}

/// A message broadcast to every registered handler.
///
/// Each handler receives its own clone, so handlers cannot observe one another.
pub trait Notification: Clone + Send + Sync + 'static {}

/// Whether a message type is dispatched with `send` or `publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Notification,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Request => "request",
            MessageKind::Notification => "notification",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! type_identity {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            id: TypeId,
            name: &'static str,
        }

        impl $name {
            pub fn of<T: ?Sized + 'static>() -> Self {
                Self {
                    id: TypeId::of::<T>(),
                    name: std::any::type_name::<T>(),
                }
            }

            pub fn id(&self) -> TypeId {
                self.id
            }

            /// Fully qualified Rust type name, for diagnostics only.
            pub fn name(&self) -> &'static str {
                self.name
            }

            /// Last path segment of the type name.
            pub fn short_name(&self) -> &'static str {
                let base = self.name.split('<').next().unwrap_or(self.name);
                base.rsplit("::").next().unwrap_or(base)
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name)
            }
        }
    };
}

type_identity!(
    /// Identity of a request or notification type.
    MessageType
);

type_identity!(
    /// Identity of a handler type, as handed to the resolver.
    HandlerType
);
