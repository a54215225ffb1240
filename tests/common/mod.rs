#![allow(dead_code)]

pub mod app;
pub mod factory;
pub mod stub;

pub use app::{test_config, TestApp};
pub use factory::{Factory, TestAuth};
pub use stub::StubServer;
