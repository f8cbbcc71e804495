pub mod admin_service;
pub mod http;
