//! Order Manager (C7): idempotent submission, broker dispatch, status
//! transitions, cancel/modify. The single choke-point through which every
//! broker order interaction flows.

mod broker;
mod gateway;
mod oms;
mod retry;
mod store;
mod types;

pub use broker::{BrokerAck, BrokerClient, BrokerError, BrokerOrderRequest};
pub use gateway::{MutationError, OrderManager, PlaceError, PlaceRequest};
pub use oms::{OmsEvent, TransitionError};
pub use retry::BackoffPolicy;
pub use store::{InMemoryOrderRepository, OrderRepository, StoreError};
pub use types::{Order, OrderStatus, OrderType, OrderValidationError};
