pub mod claims;
pub mod extractors;
pub mod jwt;
pub mod otp;
pub mod password;
pub mod services;
pub mod session;
pub mod social;
