pub mod app_state;
pub mod bus;
pub mod config;
pub mod orchestration;
