pub mod booking_client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod payloads;
pub mod venue_cache;
