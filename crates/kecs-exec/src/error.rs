use thiserror::Error;

use kecs_core::RuntimeError;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),
    #[error("no client for cluster {cluster}: {reason}")]
    Client { cluster: String, reason: String },
    #[cfg(feature = "kube")]
    #[error(transparent)]
    Kube(#[from] ::kube::Error),
    #[error("pod {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },
    #[error("invalid pod: {0}")]
    InvalidPod(String),
}

impl From<ExecError> for RuntimeError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::NotFound { namespace, name } => RuntimeError::PodNotFound { namespace, name },
            ExecError::Client { cluster, reason } => RuntimeError::ClusterAccess { cluster, reason },
            ExecError::Kubeconfig(reason) => RuntimeError::ClusterAccess {
                cluster: "ambient".into(),
                reason,
            },
            ExecError::InvalidPod(msg) => RuntimeError::Conversion(msg),
            #[cfg(feature = "kube")]
            ExecError::Kube(e) => RuntimeError::Api(e.to_string()),
        }
    }
}
