//! VM provisioning for the suite

mod backend;
mod lifecycle;
mod template;

pub use backend::VmBackend;
pub use lifecycle::{LifecycleTimeouts, VmController, VmInstance, VmState};
pub use template::VmTemplate;
