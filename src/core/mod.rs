pub mod alerts;
pub mod analysis;
pub mod config;
pub mod environment;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod workbook;
