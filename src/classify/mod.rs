mod backend;
mod backends;
mod registry;
mod result;

pub use backend::ClassifierBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::StubBackend;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::Prediction;
