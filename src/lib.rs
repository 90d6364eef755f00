pub mod api;
pub mod cities;
pub mod config;
pub mod credentials;
pub mod humanize;
pub mod mirror;
pub mod observability;
pub mod progress;
pub mod report;
pub mod schedule;
pub mod storage;
pub mod sync;
pub mod vendor;

#[cfg(test)]
mod testing;
