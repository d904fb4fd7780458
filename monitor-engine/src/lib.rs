pub mod poller;
pub mod supervisor;
pub mod timing;

pub use poller::{
    CycleReport, DeliveryOutcome, ExchangePoller, HistoryResetPolicy, PollerState, StopHandle,
};
pub use supervisor::{PollerExit, PollerStatus, PollerSupervisor};
