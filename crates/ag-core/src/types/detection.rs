//! Detection records.
//!
//! A [`Detection`] is one recognized object in an image. The detector returns
//! them in a [`DetectionOutput`] together with the path of the annotated copy it
//! wrote. The same records are serialized into image metadata after routing, so
//! the JSON shape here is also the persisted shape:
//!
//! ```json
//! {"name": "cat", "confidence": 0.91, "box": [10.0, 10.0, 50.0, 50.0]}
//! ```

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in image pixel coordinates.
///
/// Serialized as a four element array `[xmin, ymin, xmax, ymax]`.
///
/// # Examples
///
/// ```
/// use ag_core::BoundingBox;
///
/// let bbox = BoundingBox::new(10.0, 10.0, 50.0, 60.0);
/// assert_eq!(bbox.area(), 2000.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    /// Left edge.
    pub xmin: f64,
    /// Top edge.
    pub ymin: f64,
    /// Right edge.
    pub xmax: f64,
    /// Bottom edge.
    pub ymax: f64,
}

impl BoundingBox {
    /// Creates a bounding box from its corner coordinates.
    #[inline]
    #[must_use]
    pub const fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Returns the absolute area of the box.
    ///
    /// Detectors are not guaranteed to order the corners, so the sign of the
    /// product is discarded.
    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        ((self.xmax - self.xmin) * (self.ymax - self.ymin)).abs()
    }

    /// Returns how far this box moved relative to `previous`.
    ///
    /// The measure is the L1 distance between the doubled centers:
    /// `|xmin + xmax - prev.xmin - prev.xmax| + |ymin + ymax - prev.ymin - prev.ymax|`.
    ///
    /// ```
    /// use ag_core::BoundingBox;
    ///
    /// let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    /// let b = BoundingBox::new(2.0, 1.0, 12.0, 11.0);
    /// assert_eq!(b.corner_delta(&a), 6.0);
    /// ```
    #[must_use]
    pub fn corner_delta(&self, previous: &Self) -> f64 {
        let dx = self.xmin + self.xmax - previous.xmin - previous.xmax;
        let dy = self.ymin + self.ymax - previous.ymin - previous.ymax;
        dx.abs() + dy.abs()
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([xmin, ymin, xmax, ymax]: [f64; 4]) -> Self {
        Self::new(xmin, ymin, xmax, ymax)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        [bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax]
    }
}

/// A single recognized object instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label reported by the detector (e.g. `"person"`).
    pub name: String,

    /// Confidence score. Rules never look at it; it is carried for the
    /// persisted metadata.
    pub confidence: f64,

    /// Where the object is in the image.
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

impl Detection {
    /// Creates a detection.
    #[must_use]
    pub fn new(name: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            name: name.into(),
            confidence,
            bbox,
        }
    }
}

/// The result of running the detector on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionOutput {
    /// Path of the annotated copy written by the detector.
    pub annotated: Utf8PathBuf,

    /// Detections in the order the detector reported them.
    #[serde(default)]
    pub detections: Vec<Detection>,
}
