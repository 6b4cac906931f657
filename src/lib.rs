pub mod config;
pub mod customers;
pub mod durations;
pub mod error;
pub mod packages;
pub mod routes;
pub mod subscriptions;
pub mod visits;
