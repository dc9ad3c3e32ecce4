//! Order placement pipeline and lifecycle.

pub mod intake;
pub mod numbering;
pub mod reservation;
pub mod transitions;
pub mod writer;

mod service;

pub use intake::{LineRequest, PlaceOrder, ValidatedCart, ValidatedLine};
pub use numbering::{OrderNumberGenerator, TimestampOrderNumbers};
pub use service::{OrderFilter, OrderService, PlacedOrder};
pub use transitions::Transition;
