//! Calibration data model: target geometry, observations, the capture
//! session and the solved result.

mod observation;
mod pattern;
mod result;
mod session;

pub use observation::*;
pub use pattern::*;
pub use result::*;
pub use session::*;
