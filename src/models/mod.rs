pub mod display;
pub mod operator;
pub mod record;
pub mod session;

pub use display::{DisplayEntry, DisplayList, EntryStatus, UpsertKind};
pub use operator::{FixedOperator, OperatorIdentity, OperatorSource, StaffSessionFile};
pub use record::AttendanceRecord;
pub use session::{ScanSessionRecord, ScanSessionStatus};
