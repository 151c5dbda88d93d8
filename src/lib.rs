// Library exports for Bucket Buddies
// This allows integration tests and external code to use the modules

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod matching;
pub mod notify;
pub mod repository;
pub mod routes;
pub mod state;
