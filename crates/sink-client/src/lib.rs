#![doc = include_str!("../README.md")]

pub mod client;

pub use client::{SinkClient, SinkConnection, SinkInfo};
