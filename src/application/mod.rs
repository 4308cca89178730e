pub mod app_error;
pub mod ids;
pub mod ports;
pub mod use_cases;
