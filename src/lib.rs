pub mod api;
pub mod condor;
pub mod config;
pub mod controller;
pub mod error;
pub mod notify;
pub mod package;
pub mod pairing;
pub mod relmon;
pub mod remote;
pub mod service;
pub mod shutdown;
pub mod store;
