//! Utility functions.
//!
//! Collection of helper functions used across the bot.

pub mod parser;

pub use parser::{UNNAMED, button_label, extract_uuid, html_escape, is_uuid, shorten_collection_name};
