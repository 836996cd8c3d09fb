//! Notification backends for aiguard.
//!
//! An [`Action`] is invoked when a class rule matches and its throttle lets
//! the notification through. The set of backends is closed: each
//! [`ag_core::ActionConfig`] variant maps to one type here, and
//! [`ActionRegistry::from_configs`] instantiates them once at startup.
//!
//! | `type`     | Backend            |
//! |------------|--------------------|
//! | `pushover` | [`PushoverAction`] |
//! | `log`      | [`LogAction`]      |

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod action;
pub mod error;
pub mod log;
pub mod pushover;
pub mod registry;

pub use action::{Action, NotifyOutcome, SuppressReason};
pub use error::ActionError;
pub use log::LogAction;
pub use pushover::PushoverAction;
pub use registry::{ActionRegistry, build_action};
