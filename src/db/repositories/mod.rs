pub mod display_entries;
pub mod scan_sessions;
