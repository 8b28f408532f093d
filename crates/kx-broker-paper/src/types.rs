use kx_schemas::Side;
use rust_decimal::Decimal;

/// A single resting order as the paper broker sees it. Distinct from
/// `kx_execution::Order`: this only carries what a real broker would echo
/// back, not the OMS's own state machine.
#[derive(Clone, Debug, PartialEq)]
pub struct PaperOrder {
    pub broker_order_no: String,
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub price: Decimal,
    pub status: PaperOrderStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaperOrderStatus {
    Accepted,
    Canceled,
}
