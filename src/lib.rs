// SPDX-License-Identifier: GPL-3.0-only

//! arfuse - Differential AR compositing for depth-camera feeds
//!
//! This library provides the core functionality for the arfuse pipeline,
//! including depth reconstruction from a noisy sensor stream, screen-space
//! ambient occlusion and reflections, and differential compositing of
//! virtual objects against the live camera image.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`sensor`]: Depth/color stream abstraction and frame acquisition
//! - [`reconstruct`]: Temporal and spatial depth reconstruction
//! - [`passes`]: Screen-space render passes (G-buffer, AO, lighting, reflection)
//! - [`compositor`]: The differential compositor orchestrating the frame graph
//! - [`buffers`]: CPU image grids shared by every stage
//! - [`filters`]: Guided and separable filter kernels
//! - [`config`]: Pipeline configuration handling
//! - [`viz`]: Debug visualization of intermediate buffers
//!
//! # Example
//!
//! ```ignore
//! // Typically run via the binary:
//! // arfuse run -n 30 --out-dir shots
//! ```

pub mod buffers;
pub mod compositor;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod passes;
pub mod reconstruct;
pub mod sensor;
pub mod viz;

// Re-export commonly used types
pub use compositor::{CompositeFrame, DifferentialCompositor};
pub use config::PipelineConfig;
pub use errors::{FusionError, FusionResult};
pub use sensor::{CameraIntrinsics, SensorFrame, SensorStream};
