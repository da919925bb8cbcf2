//! Report formatting and delivery.

mod message;
mod sender;

pub use message::on_demand_message;
pub use sender::ReportSender;
