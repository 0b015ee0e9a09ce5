//! The two concrete services: the web pinger and the metric inserter
//!
//! Both implement the [`crate::service::Service`] contract and run fully
//! independently; the event stream is their only synchronization.

pub mod inserter;
pub mod pinger;

pub use inserter::MetricInserterService;
pub use pinger::WebPingerService;
