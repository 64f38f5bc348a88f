pub mod cli;
pub mod commands;
pub mod config;
pub mod device;
pub mod host;
pub mod keyring;
pub mod locale;
pub mod messages;
pub mod transport;
pub mod window;
