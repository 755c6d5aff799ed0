pub(crate) mod fifo_errors;
pub(crate) mod fifo_ledger;
pub(crate) mod fifo_model;

pub use fifo_errors::LedgerError;
pub use fifo_ledger::{FifoLedger, SoyInitialization};
pub use fifo_model::{ConsumedLot, FifoLot, ShortFifoLot};
