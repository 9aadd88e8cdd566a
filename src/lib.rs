pub mod board;
pub mod cli;
pub mod filter;
pub mod input;
pub mod logging;
pub mod notification;
pub mod remote;
pub mod settings;
pub mod types;
