//! STOMP transport for the archiver's [`Broker`](archiver_api::Broker) trait.

mod client;
pub mod config;
pub mod frame;

pub use client::StompBroker;
pub use config::StompConfig;
pub use frame::Frame;
