//! Domain types produced by the detector and consumed by the rule engine.
//!
//! All public types are re-exported at the crate root:
//!
//! ```
//! use ag_core::{BoundingBox, Detection, DetectionOutput};
//! ```

mod detection;

pub use detection::{BoundingBox, Detection, DetectionOutput};
