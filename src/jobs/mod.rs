// Background jobs

pub mod backup_monitor;
