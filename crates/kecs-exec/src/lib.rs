mod error;
pub use error::{ExecError, ExecResult};

#[cfg(feature = "kube")]
pub mod kube;
#[cfg(feature = "kube")]
pub use self::kube::{KubeRuntime, KubeRuntimeConfig};

#[cfg(feature = "sim")]
pub mod sim;
#[cfg(feature = "sim")]
pub use self::sim::{Scenario, Selector, SimRuntime, TimingTable};

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    #[cfg(feature = "kube")]
    pub use crate::kube::{KubeRuntime, KubeRuntimeConfig};
    #[cfg(feature = "sim")]
    pub use crate::sim::{SimRuntime, TimingTable};
}
