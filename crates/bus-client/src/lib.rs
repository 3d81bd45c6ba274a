#![doc = include_str!("../README.md")]

pub mod lease;
pub mod receiver;
pub mod transport;

pub use lease::{HeartbeatOutcome, LeaseManager, Subscription, reply_is_success};
pub use receiver::EventReceiver;
pub use transport::SubscribeStream;
