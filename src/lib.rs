pub mod app;
pub mod auth;
pub mod config;
pub mod dto;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod service;
pub mod validation;
