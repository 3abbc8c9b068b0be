//! # Core Chat Logic
//!
//! The session controller and everything it owns. It knows nothing about
//! terminals or HTTP; the server is reached through `api::ChatBackend` and
//! the view through `ChatEvent`s.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • MessageLog           │
//!                    │  • ChatSessionController│
//!                    │  • ChatEvent / ChatError│
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │   stream   │      │    api     │      │  terminal  │
//!     │  decoder   │      │  (reqwest) │      │   (main)   │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`controller`]: `ChatSessionController`, the turn state machine
//! - [`message`]: `Message`, `Sender`, `MessageLog`
//! - [`event`]: `ChatEvent`, what the view is told
//! - [`error`]: `ChatError`, what can go wrong in a turn
//! - [`config`]: settings and their resolution

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod message;

pub use controller::{ChatSessionController, TurnState};
pub use error::ChatError;
pub use event::ChatEvent;
pub use message::{Message, MessageLog, Sender};
