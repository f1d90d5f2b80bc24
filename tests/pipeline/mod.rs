pub mod gates;
pub mod scenarios;
pub mod streaming;
pub mod support;
