//! Runtime composition root (§2, §5): wires the risk engine, order manager,
//! strategy runner, fill reconciler, and outbox publisher into the one
//! multi-tasked process this spec describes, with the paper broker as the
//! concrete, in-process `BrokerClient`.

mod auth_stub;
mod composition;
mod fill_listener;
mod marketdata_hub;
mod outbox_publisher;
mod risk_context;
mod scheduler;

pub use composition::{Runtime, RuntimeConfig, RuntimeHandles};
pub use fill_listener::FillListener;
pub use marketdata_hub::MarketDataHub;
pub use outbox_publisher::{publish_batch, spawn_publisher_loop, EventPublisher, LoggingPublisher};
pub use risk_context::{load_rules, load_state, toggle_kill_switch_and_emit};
pub use scheduler::{run_tick, spawn_scheduler_loop};
