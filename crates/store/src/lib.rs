pub mod error;
pub mod memory;
pub mod model;
pub mod notification_log;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use model::{
    Order, OrderLine, OrderQuery, OrderScope, OrderStats, OrderView, Product, StatusChange, User,
};
pub use notification_log::{
    DailyCount, KindCount, LogQuery, NotificationKind, NotificationLog, NotificationRecord,
    NotificationStats, RecipientCount, TOP_RECIPIENTS,
};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{OrderStore, Reservation, Transaction};
