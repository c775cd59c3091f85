//! Error taxonomy for the runtime.
//!
//! Programming errors (ref-count underflow, invalid handles, exceeding a
//! `ThreadMap`'s capacity) are not represented here; they are fatal and
//! panic at the point of detection. Device loss is likewise fatal: it is
//! logged and aborts the process.

use ash::vk;
use thiserror::Error;

/// Shader compilation or linking failure, carrying the front-end's
/// diagnostic log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("shader compilation failed:\n{0}")]
pub struct CompileError(pub String);

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// No suitable GPU, missing required extensions, or required queue
    /// families absent. Fatal at startup.
    #[error("device creation failed: {0}")]
    DeviceCreation(String),

    /// Failure to create an OS-side surface or swapchain.
    #[error("surface creation failed: {0}")]
    Surface(String),

    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

pub type Result<T> = std::result::Result<T, Error>;
