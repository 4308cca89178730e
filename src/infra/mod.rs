pub mod app;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod gateway_client;
pub mod setup;
pub mod token_provider;
