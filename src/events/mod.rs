//! Event handler system.
//!
//! Add new event handlers by:
//! 1. Creating a new file in this directory
//! 2. Adding `pub mod your_event;` below
//! 3. Adding the handler to `event_handler()`

pub mod membership;

use teloxide::dispatching::UpdateHandler;

/// Build the combined handler for the bot's own chat member updates.
pub fn event_handler() -> UpdateHandler<anyhow::Error> {
    membership::handler()
}
