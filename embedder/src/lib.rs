//! Embedder adapter: the sole point at which the vision
//! library — detector plus face embedder — is consumed. The core never
//! hard-codes a single vision library; it is generic over `impl
//! FaceEmbedder`, with one production-shaped seam and one deterministic
//! reference implementation used in tests.

pub mod error;
pub mod reference;

use async_trait::async_trait;
pub use error::{EmbedderError, Result};
use facesrec_types::{Descriptor, DetectionMode, FaceBox};

pub const MIN_DIMENSION: u32 = 200;
pub const MAX_DIMENSION: u32 = 4000;

/// One face detection result.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub descriptor: Descriptor,
    pub face_box: FaceBox,
    pub detection_score: f32,
    pub has_landmarks: bool,
}

/// `detectAndEmbed`'s return shape: `{...} | NoFace`.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectOutcome {
    Detected(Detection),
    NoFace,
}

/// The embedder adapter's public contract.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    /// Loaded once at startup.
    async fn warmup(&self) -> Result<()>;

    /// `mode` selects the detector profile: `Register` (high-precision, used
    /// for enroll), `Recognize` (faster, used for identify), `Precise`
    /// (enroll-grade accuracy on a recognize-shaped call).
    async fn detect_and_embed(&self, image_bytes: &[u8], mode: DetectionMode) -> Result<DetectOutcome>;
}

/// Validates the decoded image's dimensions fall within the accepted
/// 200x200..=4000x4000 range. Shared by every `FaceEmbedder`
/// implementation since it's part of the contract, not provider-specific
/// behavior.
pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width < MIN_DIMENSION || height < MIN_DIMENSION || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(EmbedderError::InvalidImage {
            detail: format!("{width}x{height}"),
            min: MIN_DIMENSION,
            max: MAX_DIMENSION,
        });
    }
    Ok(())
}
