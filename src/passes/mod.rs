// SPDX-License-Identifier: GPL-3.0-only

//! Render passes and frame scheduling
//!
//! Passes execute strictly sequentially within a frame. Instead of relying
//! on issue order alone, each pass carries a descriptor naming the slots it
//! reads and writes; [`PassSchedule`] tracks written slots per frame and
//! turns a read-before-write into a typed error at the violation site.

pub mod ao;
pub mod env;
pub mod gbuffer;
pub mod lighting;
pub mod reflection;

use tracing::debug;

use crate::errors::PassError;

/// Logical buffer slots passed between render passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Raw sensor frame for this render tick
    RawFrame,
    /// Filtered normalized depth
    FilteredDepth,
    /// Reconstructed sensor position/normal buffers
    SensorGeometry,
    /// Reconstructed live color image
    LiveColor,
    /// Composed virtual + sensor geometry
    FullGeometry,
    /// Sensor-only geometry
    BackGeometry,
    /// Occlusion over the full geometry
    OcclusionFull,
    /// Occlusion over the sensor-only geometry
    OcclusionBack,
    /// Merged occlusion
    OcclusionCombined,
    /// Lit full scene
    FullLit,
    /// Lit back scene
    BackLit,
    /// Reflection color and confidence for the full scene
    ReflectionFull,
    /// Reflection color and confidence for the back scene
    ReflectionBack,
    /// Final differential composite
    Composite,
}

impl Slot {
    pub fn name(&self) -> &'static str {
        match self {
            Slot::RawFrame => "raw-frame",
            Slot::FilteredDepth => "filtered-depth",
            Slot::SensorGeometry => "sensor-geometry",
            Slot::LiveColor => "live-color",
            Slot::FullGeometry => "full-geometry",
            Slot::BackGeometry => "back-geometry",
            Slot::OcclusionFull => "occlusion-full",
            Slot::OcclusionBack => "occlusion-back",
            Slot::OcclusionCombined => "occlusion-combined",
            Slot::FullLit => "full-lit",
            Slot::BackLit => "back-lit",
            Slot::ReflectionFull => "reflection-full",
            Slot::ReflectionBack => "reflection-back",
            Slot::Composite => "composite",
        }
    }

    fn bit(&self) -> u32 {
        1 << (*self as u32)
    }
}

/// Static description of one pass: what it reads and what it writes.
#[derive(Debug, Clone, Copy)]
pub struct PassDesc {
    pub name: &'static str,
    pub reads: &'static [Slot],
    pub writes: &'static [Slot],
}

/// Tracks which slots have been written during the current frame.
#[derive(Debug, Default)]
pub struct PassSchedule {
    written: u32,
}

impl PassSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all writes; called at the top of every frame.
    pub fn begin_frame(&mut self) {
        self.written = 0;
    }

    /// Validate a pass's reads against slots written this frame, then mark
    /// its writes.
    pub fn record(&mut self, pass: &PassDesc) -> Result<(), PassError> {
        for slot in pass.reads {
            if self.written & slot.bit() == 0 {
                return Err(PassError::MissingInput {
                    pass: pass.name,
                    slot: slot.name(),
                });
            }
        }
        for slot in pass.writes {
            self.written |= slot.bit();
        }
        debug!(pass = pass.name, "Pass recorded");
        Ok(())
    }

    pub fn is_written(&self, slot: Slot) -> bool {
        self.written & slot.bit() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACQUIRE: PassDesc = PassDesc {
        name: "acquire",
        reads: &[],
        writes: &[Slot::RawFrame],
    };
    const RECONSTRUCT: PassDesc = PassDesc {
        name: "reconstruct",
        reads: &[Slot::RawFrame],
        writes: &[Slot::FilteredDepth, Slot::SensorGeometry, Slot::LiveColor],
    };

    #[test]
    fn test_ordered_passes_record_cleanly() {
        let mut schedule = PassSchedule::new();
        schedule.begin_frame();
        schedule.record(&ACQUIRE).unwrap();
        schedule.record(&RECONSTRUCT).unwrap();
        assert!(schedule.is_written(Slot::SensorGeometry));
        assert!(!schedule.is_written(Slot::Composite));
    }

    #[test]
    fn test_read_before_write_is_reported() {
        let mut schedule = PassSchedule::new();
        schedule.begin_frame();
        let err = schedule.record(&RECONSTRUCT).unwrap_err();
        match err {
            PassError::MissingInput { pass, slot } => {
                assert_eq!(pass, "reconstruct");
                assert_eq!(slot, "raw-frame");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_begin_frame_clears_writes() {
        let mut schedule = PassSchedule::new();
        schedule.begin_frame();
        schedule.record(&ACQUIRE).unwrap();
        schedule.begin_frame();
        assert!(!schedule.is_written(Slot::RawFrame));
        assert!(schedule.record(&RECONSTRUCT).is_err());
    }
}
