pub mod backend;
pub mod catalog;
pub mod client;
pub mod configuration;
pub mod configuration_handler;
pub mod database_interface;
pub mod error;
pub mod http;
pub mod local_slots;
pub mod schedule;
mod schema;
pub mod slot_manager;
#[cfg(test)]
mod testutils;
pub mod types;
