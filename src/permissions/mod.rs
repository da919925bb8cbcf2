//! Permission system for checking who may use the bot.
//!
//! Access is a flat lookup in the staff list: listed managers are allowed,
//! everyone else is refused. Commands only work in private chats.
//!
//! ## Usage
//!
//! ```rust
//! match state.permissions.check(&msg.chat, msg.from.as_ref().map(|u| u.id)).await {
//!     Access::Granted => { /* ... */ }
//!     Access::NotPrivate | Access::Denied => { /* refuse */ }
//! }
//! ```

mod checker;

pub use checker::{Access, Permissions};
