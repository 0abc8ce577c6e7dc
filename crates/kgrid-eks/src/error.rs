//! Error types for EKS provisioning.

use std::sync::LazyLock;

use kgrid_core::ProcessError;
use regex::Regex;
use thiserror::Error;

/// `An error occurred (InvalidVpcID.NotFound) when calling the ...`
static AWS_ERROR_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"An error occurred \(([A-Za-z0-9.]+)\)").ok());

const NOT_FOUND_CODES: &[&str] = &["ResourceNotFoundException", "NoSuchEntity"];
const ALREADY_EXISTS_CODES: &[&str] = &["ResourceInUseException", "EntityAlreadyExists"];

/// AWS error code printed by the CLI on failure, if any.
pub fn aws_error_code(stderr: &str) -> Option<String> {
    let captures = AWS_ERROR_CODE.as_ref()?.captures(stderr)?;
    captures.get(1).map(|m| m.as_str().to_string())
}

pub type EksResult<T> = Result<T, EksError>;

#[derive(Debug, Error)]
pub enum EksError {
    /// The resource being created is already there (`ResourceInUseException`).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The resource being described or deleted is gone (`ResourceNotFoundException`).
    #[error("not found: {0}")]
    NotFound(String),

    #[error("aws {operation} failed: {message}")]
    Api {
        operation: String,
        /// AWS error code, e.g. `RouteAlreadyExists`.
        code: Option<String>,
        message: String,
    },

    #[error("failed to parse aws {operation} response: {source}")]
    Parse {
        operation: String,
        source: serde_json::Error,
    },

    #[error("aws {operation} response missing {field}")]
    MissingField { operation: String, field: String },

    #[error("failed to render kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("timed out waiting for {0}")]
    TimedOut(String),
}

impl EksError {
    /// Classify a failed `aws` invocation by the AWS error code in its stderr.
    pub fn from_process(operation: &str, err: ProcessError) -> Self {
        let stderr = err.stderr().trim();
        let code = aws_error_code(stderr);
        match code.as_deref() {
            Some(c) if NOT_FOUND_CODES.contains(&c) => EksError::NotFound(stderr.to_string()),
            Some(c) if ALREADY_EXISTS_CODES.contains(&c) => {
                EksError::AlreadyExists(stderr.to_string())
            }
            _ => EksError::Api {
                operation: operation.to_string(),
                code,
                message: err.to_string(),
            },
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            EksError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EksError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, EksError::AlreadyExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(stderr: &str) -> ProcessError {
        ProcessError::Failed {
            command: "aws eks".to_string(),
            status: "exit status: 254".to_string(),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn classifies_not_found() {
        let err = EksError::from_process(
            "eks delete-cluster",
            failed("An error occurred (ResourceNotFoundException) when calling the DeleteCluster operation: No cluster found for name: grid-x."),
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn classifies_already_exists() {
        let err = EksError::from_process(
            "eks create-cluster",
            failed("An error occurred (ResourceInUseException) when calling the CreateCluster operation: Cluster already exists with name: grid-x"),
        );
        assert!(err.is_already_exists());
    }

    #[test]
    fn other_failures_keep_operation() {
        let err = EksError::from_process("ec2 create-vpc", failed("AccessDenied"));
        assert!(matches!(err, EksError::Api { code: None, .. }));
        assert!(err.to_string().contains("ec2 create-vpc"), "{err}");
    }

    #[test]
    fn extracts_dotted_codes() {
        let err = EksError::from_process(
            "ec2 create-route",
            failed("\nAn error occurred (RouteAlreadyExists) when calling the CreateRoute operation: The route identified by 0.0.0.0/0 already exists.\n"),
        );
        assert_eq!(err.code(), Some("RouteAlreadyExists"));
        assert!(!err.is_already_exists());
        assert_eq!(
            aws_error_code("An error occurred (InvalidVpcID.NotFound) when calling the DescribeVpcs operation"),
            Some("InvalidVpcID.NotFound".to_string())
        );
    }

    #[test]
    fn timeouts_are_not_classified() {
        let err = EksError::from_process(
            "eks describe-cluster",
            ProcessError::TimedOut {
                command: "aws eks describe-cluster".to_string(),
                timeout: std::time::Duration::from_secs(1),
                stdout: String::new(),
            },
        );
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}
