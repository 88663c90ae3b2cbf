pub mod analytics;
pub mod api;
pub mod app;
pub mod auth;
pub mod codegen;
pub mod config;
pub mod models;
pub mod redirect;
pub mod service;
pub mod storage;
pub mod sweeper;
pub mod visits;

pub use app::App;
