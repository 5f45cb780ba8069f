//! Background metadata enrichment.
//!
//! The [`Scheduler`] owns the pacing and the bookkeeping; an
//! [`EnrichmentClient`] only answers lookups. Clients can be stacked with
//! [`Chain`].

mod client;
pub mod error;
mod scheduler;

pub use self::client::{Chain, EnrichmentClient, Enrichment, Lookup, NullClient, Query};
pub use self::scheduler::{Progress, Scheduler, SchedulerOptions};
