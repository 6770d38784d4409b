pub mod api;
pub mod calendar;
pub mod config;
pub mod db;
pub mod files;
pub mod models;
pub mod notify;
pub mod ports;
pub mod retry;
pub mod todos;
