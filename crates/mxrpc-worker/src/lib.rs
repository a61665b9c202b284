//! MxRPC Worker
//!
//! This crate provides the worker node that serves `Worker.execute`, and the
//! [`OperationExecutor`] that does the matrix arithmetic.

pub mod executor;
pub mod node;

pub use executor::OperationExecutor;
pub use node::{Node, NodeConfig, WorkerServer};
