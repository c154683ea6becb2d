//! Narrow contracts to the subsystems the driver sequences but does not own:
//! the program parser, the compiled-program format, the compute device and
//! the image encoder.
//!
//! The driver only ever talks to these through the traits below. The
//! in-tree [`host`] implementation runs programs on the CPU so the command
//! line works end to end without a GPU.
//!
//! # Buffers
//!
//! [`DeviceBuffer`] is a shared handle to device-resident pixel storage, like
//! a device memory object. Cloning the handle does not copy the pixels.
//! Releasing through any clone frees the storage for all of them; later
//! reads observe [`DeviceBuffer::is_released`].

pub mod codec;
pub mod encode;
pub mod host;
pub mod kernels;
pub mod program;

use anyhow::Result;
use image::RgbaImage;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::FlError;

pub use kernels::{InstructionSet, KernelReport};
pub use program::{CheckProfile, Program};

/// Parses program source text into a [`Program`].
pub trait ProgramParser: Send + Sync {
    /// Parse the file at `path`, with the given define tags enabled.
    fn parse(&self, path: &Path, defines: &[String]) -> Result<Program>;
}

/// A compute device able to compile kernels and execute programs.
///
/// Shared between the driver thread and the finalization workers as
/// `Arc<dyn ComputeDevice>`. Workers only call [`ComputeDevice::read_back`].
pub trait ComputeDevice: Send + Sync {
    /// Device name for logs.
    fn name(&self) -> &str;

    /// Compile one kernel source file and return the kernel names it defines.
    fn compile_kernels(&self, path: &Path, source: &str) -> Result<Vec<String>>;

    /// Allocate a zeroed RGBA buffer. Fails for sizes outside
    /// `1..=MAX_DIMENSION` on either side.
    fn allocate(&self, label: &str, width: u32, height: u32) -> Result<DeviceBuffer>;

    /// Run `program` from its entry point against `input` and return the
    /// active buffer when it finishes.
    fn execute(
        &self,
        program: &Program,
        instructions: &InstructionSet,
        input: &DeviceBuffer,
        warm: bool,
    ) -> Result<DeviceBuffer>;

    /// Copy a buffer back to host memory.
    fn read_back(&self, buffer: &DeviceBuffer) -> Result<RgbaImage>;
}

/// Encodes an image and writes it to disk.
pub trait ImageSink: Send + Sync {
    fn write(&self, image: &RgbaImage, dest: &Path) -> Result<()>;
}

/// Shared handle to RGBA8 pixel storage owned by a device.
#[derive(Clone)]
pub struct DeviceBuffer {
    inner: Arc<BufferInner>,
}

struct BufferInner {
    label: String,
    width: u32,
    height: u32,
    pixels: Mutex<Option<Vec<u8>>>,
}

/// Largest width or height a buffer may have.
pub const MAX_DIMENSION: u32 = 16384;

/// Byte length of a `width`x`height` RGBA8 buffer.
pub fn buffer_len(width: u32, height: u32) -> Result<usize, FlError> {
    let invalid = || FlError::InvalidResolution {
        width,
        height,
        max: MAX_DIMENSION,
    };
    if !(1..=MAX_DIMENSION).contains(&width) || !(1..=MAX_DIMENSION).contains(&height) {
        return Err(invalid());
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(invalid)
}

impl DeviceBuffer {
    pub fn new(label: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        Self {
            inner: Arc::new(BufferInner {
                label: label.into(),
                width,
                height,
                pixels: Mutex::new(Some(pixels)),
            }),
        }
    }

    pub fn zeroed(label: impl Into<String>, width: u32, height: u32) -> Result<Self, FlError> {
        let len = buffer_len(width, height)?;
        Ok(Self::new(label, width, height, vec![0; len]))
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn is_released(&self) -> bool {
        self.lock().is_none()
    }

    /// Free the storage. Idempotent.
    pub fn release(&self) {
        self.lock().take();
    }

    /// Run `f` over the pixels, or return `None` if the buffer was released.
    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.lock().as_deref().map(f)
    }

    pub fn with_pixels_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        self.lock().as_deref_mut().map(f)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<u8>>> {
        self.inner
            .pixels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("label", &self.inner.label)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_visible_through_clones() {
        let buffer = DeviceBuffer::zeroed("Input", 2, 2).unwrap();
        let clone = buffer.clone();
        assert!(!clone.is_released());

        buffer.release();
        assert!(clone.is_released());
        assert!(clone.with_pixels(|p| p.len()).is_none());

        // second release is a no-op
        clone.release();
    }

    #[test]
    fn pixels_are_mutable_until_released() {
        let buffer = DeviceBuffer::zeroed("Input", 1, 1).unwrap();
        buffer.with_pixels_mut(|p| p.fill(7)).unwrap();
        assert_eq!(buffer.with_pixels(|p| p.to_vec()).unwrap(), vec![7, 7, 7, 7]);
    }

    #[test]
    fn oversized_buffer_is_an_error_not_a_panic() {
        let err = DeviceBuffer::zeroed("Input", 65536, 16384).unwrap_err();
        assert!(matches!(
            err,
            FlError::InvalidResolution {
                width: 65536,
                height: 16384,
                ..
            }
        ));
        assert!(DeviceBuffer::zeroed("Input", 0, 4).is_err());
        assert_eq!(buffer_len(MAX_DIMENSION, MAX_DIMENSION).unwrap(), 16384 * 16384 * 4);
    }
}
