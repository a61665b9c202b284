use mxrpc_common::protocol::error::{MxrpcError, Result};
use mxrpc_common::protocol::{Matrix, MatrixRequest, OperationKind};

/// Runs the arithmetic for one job.
///
/// Every shape check happens before the output is allocated, so an error
/// never comes with a partial result.
#[derive(Debug, Default, Clone, Copy)]
pub struct OperationExecutor;

impl OperationExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Computes the result matrix for `request`.
    ///
    /// # Errors
    ///
    /// - `InvalidOperation` for an unknown operation, or a missing `matrix_b`
    ///   on `add`/`multiply`
    /// - `DimensionMismatch` for ragged or incompatible matrices
    /// - `InvalidOperation` when a result entry is not finite
    pub fn execute(&self, request: &MatrixRequest) -> Result<Matrix> {
        match &request.operation {
            OperationKind::Add => add(&request.matrix_a, second_operand(request)?),
            OperationKind::Multiply => multiply(&request.matrix_a, second_operand(request)?),
            OperationKind::Transpose => transpose(&request.matrix_a),
            OperationKind::Other(name) => Err(MxrpcError::InvalidOperation(format!(
                "unknown operation '{}'",
                name
            ))),
        }
    }
}

fn second_operand(request: &MatrixRequest) -> Result<&Matrix> {
    request.matrix_b.as_ref().ok_or_else(|| {
        MxrpcError::InvalidOperation(format!("{} requires matrix_b", request.operation))
    })
}

/// Element-wise sum of two matrices of identical shape.
pub fn add(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    let shape_a = a.shape()?;
    let shape_b = b.shape()?;
    if shape_a != shape_b {
        return Err(MxrpcError::DimensionMismatch(format!(
            "cannot add {}x{} and {}x{}",
            shape_a.0, shape_a.1, shape_b.0, shape_b.1
        )));
    }

    let rows = a
        .rows()
        .iter()
        .zip(b.rows())
        .map(|(ra, rb)| ra.iter().zip(rb).map(|(x, y)| x + y).collect())
        .collect();
    finite(Matrix::new(rows))
}

/// Matrix product `a * b`; `cols(a)` must equal `rows(b)`.
pub fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    let (rows_a, cols_a) = a.shape()?;
    let (rows_b, cols_b) = b.shape()?;
    if cols_a != rows_b {
        return Err(MxrpcError::DimensionMismatch(format!(
            "cannot multiply {}x{} by {}x{}",
            rows_a, cols_a, rows_b, cols_b
        )));
    }

    let b_rows = b.rows();
    let rows = a
        .rows()
        .iter()
        .map(|row| {
            (0..cols_b)
                .map(|j| row.iter().zip(b_rows).map(|(x, rb)| x * rb[j]).sum::<f64>())
                .collect()
        })
        .collect();
    finite(Matrix::new(rows))
}

/// JSON has no encoding for `inf` or `NaN`, so such a result is rejected here.
fn finite(result: Matrix) -> Result<Matrix> {
    if result.rows().iter().flatten().all(|x| x.is_finite()) {
        Ok(result)
    } else {
        Err(MxrpcError::InvalidOperation("result overflows f64".to_string()))
    }
}

pub fn transpose(a: &Matrix) -> Result<Matrix> {
    let (rows, cols) = a.shape()?;
    let source = a.rows();
    let out = (0..cols)
        .map(|j| (0..rows).map(|i| source[i][j]).collect())
        .collect();
    Ok(Matrix::new(out))
}
