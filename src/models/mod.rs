// Domain models: per-device backup outcome and the fleet run aggregate

mod fleet;
mod outcome;

pub use fleet::{DeviceResult, FleetRun, FleetRunBuilder};
pub use outcome::{
    BackupOutcome, DEFAULT_HTTP_MGMT_PORT, DEFAULT_SSH_PORT, ExtraValue, REPORT_COLUMNS,
    TransportKind, report_bool, report_timestamp,
};
