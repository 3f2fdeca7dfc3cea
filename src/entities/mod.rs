pub mod email_log;
pub mod order;
pub mod order_measurement;
