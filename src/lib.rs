pub mod assemble;
pub mod auth;
pub mod compile;
pub mod config;
pub mod db;
pub mod deliver;
pub mod error;
pub mod mailer;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod template;
