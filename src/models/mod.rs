pub mod email;
pub mod order;
pub mod statistics;

pub use email::{Audience, EmailLogEntry, EmailPayload, EmailStatus, EmailStyles, EmailTemplate};
pub use order::{
    Customer, InsertedOrder, Measurement, NewOrder, Order, OrderFilter, OrderStatus,
};
pub use statistics::{RecentOrder, StatisticsReport};
