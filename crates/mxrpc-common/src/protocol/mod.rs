pub mod error;
pub mod matrix;
pub mod requests;
pub mod responses;
pub mod status;

#[cfg(test)]
mod tests;

pub use error::{ErrorCode, MxrpcError, Result, RpcError};
pub use matrix::{procedures, Matrix, MatrixRequest, MatrixResponse, OperationKind};
pub use requests::{ProcedureName, Request, RequestId, RpcArgs};
pub use responses::{Response, RpcResult};
pub use status::{DispatchStatus, WorkerStatus};
