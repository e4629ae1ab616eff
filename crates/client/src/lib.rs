//! Client code for vrcache.
//!
//! This crate provides the network layer and the offline asset cache
//! worker, plus the host that drives its lifecycle.

pub mod fetch;
pub mod worker;

pub use fetch::{FetchClient, FetchConfig, Network};
pub use worker::{
    ClientId, FetchOutcome, FetchSource, InstallReport, OfflineWorker, StartReport, WorkerHost, WorkerSettings,
    WorkerState,
};
