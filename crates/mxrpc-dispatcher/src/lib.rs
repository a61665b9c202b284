//! MxRPC Dispatcher
//!
//! Routes each matrix job to the least-busy connected worker, evicts workers
//! whose calls fail, reconnects them in the background of later requests, and
//! gives up with `AllWorkersDown` once the pool has been empty for the
//! configured timeout.

pub mod dispatcher;
pub mod registry;
pub mod selector;
pub mod server;

pub use dispatcher::{DispatchConfig, Dispatcher};
pub use registry::{Endpoint, JobGuard, WorkerRegistry};
pub use selector::select_least_busy;
pub use server::{handle_request, DispatcherServer};

#[cfg(test)]
mod test_support;
