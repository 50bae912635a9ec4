//! # Vigil Server
//!
//! Reconnaissance scan orchestration with real-time event fan-out.
//!
//! ## Overview
//!
//! Vigil drives multi-phase reconnaissance scans (subdomain enumeration
//! followed by port scanning) against a target, persisting incrementally
//! discovered results and relaying progress to WebSocket clients as it
//! happens:
//!
//! - **Scan Orchestrator**: per-scan state machine supervising the
//!   external scanner subprocesses
//! - **Event Bus**: fire-and-forget pub/sub of typed scan events over a
//!   single well-known channel
//! - **WebSocket Gateways**: room-based scan feeds plus channel-based
//!   notification and execution-log subscriptions
//!
//! ## Architecture
//!
//! The server is built on Axum and uses:
//! - PostgreSQL as the system of record for scan state
//! - Redis pub/sub as the event transport between processes
//! - External scanner programs speaking newline-delimited JSON on stdout

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;
pub mod scanner;
pub mod websocket;
