#![doc = include_str!("../README.md")]

pub mod pattern;
pub mod processor;

pub use pattern::parse_point_pattern;
pub use processor::IndicatorProcessor;
