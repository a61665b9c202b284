//! Matrix jobs: the payload of `Dispatch.process` and `Worker.execute`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{MxrpcError, Result};

/// Remote procedure names.
pub mod procedures {
    /// Client -> dispatcher: run one matrix job on the least-busy worker.
    pub const DISPATCH_PROCESS: &str = "Dispatch.process";
    /// Client -> dispatcher: snapshot of the worker pool.
    pub const DISPATCH_STATUS: &str = "Dispatch.status";
    /// Dispatcher -> worker: compute one matrix job.
    pub const WORKER_EXECUTE: &str = "Worker.execute";
}

/// A dense row-major matrix of `f64`.
///
/// Serialized as a plain JSON array of rows. Nothing stops a peer from
/// sending ragged rows, so [`Matrix::shape`] validates before any arithmetic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix(Vec<Vec<f64>>);

impl Matrix {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.0
    }

    /// Returns `(rows, cols)`.
    ///
    /// An empty matrix has shape `(0, 0)`.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if the rows do not all have the same length.
    pub fn shape(&self) -> Result<(usize, usize)> {
        let cols = self.0.first().map(Vec::len).unwrap_or(0);
        if let Some((i, row)) = self.0.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(MxrpcError::DimensionMismatch(format!(
                "row {} has {} columns, expected {}",
                i,
                row.len(),
                cols
            )));
        }
        Ok((self.0.len(), cols))
    }
}

impl From<Vec<Vec<f64>>> for Matrix {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        Self(rows)
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.0 {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(f, "[{}]", cells.join(" "))?;
        }
        Ok(())
    }
}

/// The operation a job asks for.
///
/// Unrecognized names are kept as `Other` so the worker can reject them with
/// an `InvalidOperation` error instead of failing to decode the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    Add,
    Multiply,
    Transpose,
    Other(String),
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Multiply => "multiply",
            OperationKind::Transpose => "transpose",
            OperationKind::Other(name) => name,
        }
    }
}

impl From<String> for OperationKind {
    fn from(name: String) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "add" => OperationKind::Add,
            "multiply" => OperationKind::Multiply,
            "transpose" => OperationKind::Transpose,
            _ => OperationKind::Other(name),
        }
    }
}

impl From<&str> for OperationKind {
    fn from(name: &str) -> Self {
        OperationKind::from(name.to_string())
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        kind.as_str().to_string()
    }
}

impl FromStr for OperationKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(OperationKind::from(s))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matrix job as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRequest {
    pub operation: OperationKind,
    pub matrix_a: Matrix,
    /// Required for `add` and `multiply`, ignored for `transpose`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_b: Option<Matrix>,
}

impl MatrixRequest {
    pub fn new(operation: impl Into<OperationKind>, matrix_a: Matrix, matrix_b: Option<Matrix>) -> Self {
        Self {
            operation: operation.into(),
            matrix_a,
            matrix_b,
        }
    }

    pub fn add(a: impl Into<Matrix>, b: impl Into<Matrix>) -> Self {
        Self::new(OperationKind::Add, a.into(), Some(b.into()))
    }

    pub fn multiply(a: impl Into<Matrix>, b: impl Into<Matrix>) -> Self {
        Self::new(OperationKind::Multiply, a.into(), Some(b.into()))
    }

    pub fn transpose(a: impl Into<Matrix>) -> Self {
        Self::new(OperationKind::Transpose, a.into(), None)
    }
}

/// The computed matrix and the identifier of the worker that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixResponse {
    pub result: Matrix,
    pub worker: String,
}
