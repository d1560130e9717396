pub mod app;
pub mod apps;
pub mod auth;
pub mod config;
pub mod error;
pub mod files;
pub mod graphql;
pub mod i18n;
pub mod notify;
pub mod pagination;
pub mod ratelimit;
pub mod roles;
pub mod state;
pub mod storage;
pub mod store;
pub mod users;
