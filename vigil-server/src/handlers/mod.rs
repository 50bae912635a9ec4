pub mod executions_ws;
pub mod notifications_ws;
pub mod scans_api;
pub mod scans_ws;
