//! Built-in operations.

mod audit;
mod capture;
mod remote;
mod rename;
mod stage_commit;

pub use audit::AuditReport;
pub use capture::{CaptureRef, RestoreRef};
pub use remote::{convert_remote_url, RemoteProtocol, RemoteProtocolOp};
pub use rename::RenamePath;
pub use stage_commit::StageCommit;
