#![allow(dead_code)]

pub mod fake_driver;
pub mod fixtures;
pub mod wiremock_helpers;
