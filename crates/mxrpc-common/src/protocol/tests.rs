//! Tests for the protocol module
//!
//! Covers request IDs, response/error mapping and the matrix job payloads.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_request_creation() {
        let req = Request::new(procedures::WORKER_EXECUTE, json!({"operation": "add"}));
        assert_eq!(req.method, "Worker.execute");
        assert_eq!(req.args, json!({"operation": "add"}));
    }

    #[test]
    fn test_request_id_uniqueness() {
        let ids: HashSet<_> = (0..1000)
            .map(|_| Request::new("test", json!({})).id)
            .collect();
        assert_eq!(ids.len(), 1000, "All request IDs should be unique");
    }

    #[test]
    fn test_request_id_uniqueness_across_threads() {
        use std::sync::{Arc, Mutex};
        use std::thread;

        let ids = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = vec![];

        for _ in 0..8 {
            let ids = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    let id = Request::new("test", json!({})).id;
                    assert!(ids.lock().unwrap().insert(id), "Duplicate ID detected: {}", id);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ids.lock().unwrap().len(), 4000);
    }

    #[test]
    fn test_response_success() {
        let resp = Response::success(123, json!([[1.0]]));
        assert!(resp.success);
        assert_eq!(resp.id, 123);
        assert!(resp.error.is_none());
        assert_eq!(resp.into_result().unwrap(), json!([[1.0]]));
    }

    #[test]
    fn test_response_error_rebuilds_variant() {
        let err = MxrpcError::DimensionMismatch("2x2 vs 3x3".to_string());
        let resp = Response::from_error(7, &err);
        assert!(!resp.success);
        assert_eq!(resp.error.as_ref().unwrap().code, ErrorCode::DimensionMismatch);

        match resp.into_result() {
            Err(MxrpcError::DimensionMismatch(msg)) => assert_eq!(msg, "2x2 vs 3x3"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_all_workers_down_keeps_waited_ms_over_the_wire() {
        let err = MxrpcError::AllWorkersDown { waited_ms: 61_000 };
        let wire = serde_json::to_vec(&Response::from_error(1, &err)).unwrap();
        let resp: Response = serde_json::from_slice(&wire).unwrap();

        match resp.into_result() {
            Err(MxrpcError::AllWorkersDown { waited_ms }) => assert_eq!(waited_ms, 61_000),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_success_without_result_is_invalid() {
        let resp = Response {
            id: 1,
            result: None,
            error: None,
            success: true,
        };
        assert!(matches!(resp.into_result(), Err(MxrpcError::InvalidResponse(_))));
    }

    #[test]
    fn test_error_classification() {
        assert!(MxrpcError::Connection("refused".into()).is_retryable());
        assert!(MxrpcError::NoWorkersAvailable.is_retryable());
        assert!(!MxrpcError::InvalidOperation("x".into()).is_retryable());
        assert!(MxrpcError::InvalidOperation("x".into()).is_input_error());
        assert!(MxrpcError::DimensionMismatch("x".into()).is_input_error());
        assert!(!MxrpcError::AllWorkersDown { waited_ms: 0 }.is_input_error());
    }

    #[test]
    fn test_error_code_wire_names() {
        let value = serde_json::to_value(ErrorCode::AllWorkersDown).unwrap();
        assert_eq!(value, json!("all_workers_down"));
    }

    #[test]
    fn test_operation_kind_parsing() {
        assert_eq!(OperationKind::from("add"), OperationKind::Add);
        assert_eq!(OperationKind::from(" Multiply "), OperationKind::Multiply);
        assert_eq!(OperationKind::from("TRANSPOSE"), OperationKind::Transpose);
        assert_eq!(
            OperationKind::from("subtract"),
            OperationKind::Other("subtract".to_string())
        );
    }

    #[test]
    fn test_matrix_request_wire_format() {
        let req = MatrixRequest::transpose(vec![vec![1.0, 2.0]]);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"operation": "transpose", "matrix_a": [[1.0, 2.0]]})
        );

        let parsed: MatrixRequest =
            serde_json::from_value(json!({"operation": "pow", "matrix_a": [[1.0]]})).unwrap();
        assert_eq!(parsed.operation, OperationKind::Other("pow".to_string()));
        assert!(parsed.matrix_b.is_none());
    }

    #[test]
    fn test_matrix_shape() {
        let m = Matrix::new(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(m.shape().unwrap(), (2, 3));
        assert_eq!(Matrix::default().shape().unwrap(), (0, 0));

        let ragged = Matrix::new(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(ragged.shape(), Err(MxrpcError::DimensionMismatch(_))));
    }
}
