// SPDX-License-Identifier: GPL-3.0-only

//! Differential compositing of virtual content over the live image
//!
//! Every frame runs the same pipeline twice: once over the composed
//! virtual + sensor geometry (full scene) and once over the sensor
//! geometry alone (back scene). Both go through identical AO, lighting
//! and reflection stages, so the two lit images differ only where virtual
//! content changed the light transport. The combine step multiplies the
//! live camera image by the clamped per-pixel ratio of the two, which
//! transfers exactly that delta: untouched pixels reproduce the live
//! image bit for bit, pixels shadowed or lit by virtual objects darken
//! or brighten accordingly.
//!
//! Pass order is fixed and validated by [`PassSchedule`]; reading a slot
//! no earlier pass wrote surfaces as [`PassError::MissingInput`] instead
//! of stale data.

use std::time::Instant;

use glam::{Vec3, Vec4};
use tracing::{debug, info};

use crate::buffers::{ColorGrid, Grid, depth_valid};
use crate::config::PipelineConfig;
use crate::constants::{COMBINE_EPSILON, COMBINE_MAX};
use crate::errors::{FusionResult, SensorError};
use crate::passes::ao::{AmbientOcclusionPass, LAYER_FULL, LAYER_SENSOR};
use crate::passes::env::EnvironmentMap;
use crate::passes::gbuffer::{GBuffer, VirtualObject, compose_scene};
use crate::passes::lighting::LightingPass;
use crate::passes::reflection::ReflectionPass;
use crate::passes::{PassDesc, PassSchedule, Slot};
use crate::reconstruct::DepthReconstructor;
use crate::sensor::{FrameCell, SensorFrame, SensorStream};

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
const GBUFFER: PassDesc = PassDesc {
    name: "gbuffer-compose",
    reads: &[Slot::SensorGeometry],
    writes: &[Slot::FullGeometry, Slot::BackGeometry],
};
const AO_FULL: PassDesc = PassDesc {
    name: "ao-full",
    reads: &[Slot::FullGeometry, Slot::LiveColor],
    writes: &[Slot::OcclusionFull],
};
const AO_BACK: PassDesc = PassDesc {
    name: "ao-back",
    reads: &[Slot::BackGeometry, Slot::LiveColor],
    writes: &[Slot::OcclusionBack],
};
const AO_COMBINE: PassDesc = PassDesc {
    name: "ao-combine",
    reads: &[Slot::OcclusionFull, Slot::OcclusionBack, Slot::LiveColor],
    writes: &[Slot::OcclusionCombined],
};
const LIGHT_FULL: PassDesc = PassDesc {
    name: "lighting-full",
    reads: &[Slot::FullGeometry, Slot::OcclusionFull],
    writes: &[Slot::FullLit],
};
const LIGHT_BACK: PassDesc = PassDesc {
    name: "lighting-back",
    reads: &[Slot::BackGeometry, Slot::OcclusionBack],
    writes: &[Slot::BackLit],
};
const REFLECT_FULL: PassDesc = PassDesc {
    name: "reflection-full",
    reads: &[Slot::FullGeometry, Slot::FullLit],
    writes: &[Slot::ReflectionFull],
};
const REFLECT_BACK: PassDesc = PassDesc {
    name: "reflection-back",
    reads: &[Slot::BackGeometry, Slot::BackLit],
    writes: &[Slot::ReflectionBack],
};
const COMBINE: PassDesc = PassDesc {
    name: "combine",
    reads: &[
        Slot::FullLit,
        Slot::BackLit,
        Slot::ReflectionFull,
        Slot::ReflectionBack,
        Slot::LiveColor,
    ],
    writes: &[Slot::Composite],
};

/// One rendered output frame. Ephemeral; overwritten by the next render.
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    /// Final RGBA image.
    pub color: ColorGrid,
    /// Running render counter, starting at 1 for the first frame.
    pub frame_index: u64,
    /// True when the sensor reconstruction was reused from an earlier
    /// frame because no new sensor data arrived.
    pub stale: bool,
}

/// Orchestrates the full-versus-back render and the live-image merge.
pub struct DifferentialCompositor {
    width: u32,
    height: u32,
    schedule: PassSchedule,
    reconstructor: DepthReconstructor,
    ao: AmbientOcclusionPass,
    lighting: LightingPass,
    reflection: ReflectionPass,
    environment: EnvironmentMap,
    irradiance: EnvironmentMap,
    objects: Vec<VirtualObject>,
    full_scene: ColorGrid,
    back_scene: ColorGrid,
    virtual_front: Grid<bool>,
    reflection_aux: Grid<f32>,
    composite: CompositeFrame,
}

impl DifferentialCompositor {
    /// Build the pipeline for `config`. A zero-sized resolution is a
    /// fatal configuration error.
    pub fn new(config: PipelineConfig) -> FusionResult<Self> {
        config.validate()?;
        let (width, height) = (config.width, config.height);
        let (w, h) = (width as usize, height as usize);

        let environment = EnvironmentMap::vertical_gradient(
            Vec3::new(0.35, 0.45, 0.60),
            Vec3::new(0.55, 0.53, 0.50),
            Vec3::new(0.25, 0.22, 0.20),
        );
        let irradiance = EnvironmentMap::solid(environment.average());

        info!(width, height, "Compositor ready");
        Ok(Self {
            width,
            height,
            schedule: PassSchedule::new(),
            reconstructor: DepthReconstructor::new(width, height, config.reconstruct),
            ao: AmbientOcclusionPass::new(width, height, config.ao),
            lighting: LightingPass::new(),
            reflection: ReflectionPass::new(width, height, config.reflection),
            environment,
            irradiance,
            objects: Vec::new(),
            full_scene: Grid::new(w, h, Vec4::ZERO),
            back_scene: Grid::new(w, h, Vec4::ZERO),
            virtual_front: Grid::new(w, h, false),
            reflection_aux: Grid::new(w, h, 0.0),
            composite: CompositeFrame {
                color: Grid::new(w, h, Vec4::ZERO),
                frame_index: 0,
                stale: false,
            },
        })
    }

    /// Feed one sensor frame into the reconstruction chain.
    pub fn push_frame(&mut self, frame: &SensorFrame) -> FusionResult<()> {
        self.reconstructor.ingest(frame)
    }

    /// Record that no sensor frame arrived for this render tick.
    pub fn note_missed_frame(&mut self) {
        self.reconstructor.note_missed_frame();
    }

    /// Pull the next frame from a stream. A temporarily empty stream is
    /// non-fatal; the previous reconstruction is reused.
    pub fn pump<S: SensorStream>(&mut self, stream: &mut S) -> FusionResult<bool> {
        match stream.next_frame() {
            Ok(frame) => {
                self.reconstructor.ingest(&frame)?;
                Ok(true)
            }
            Err(SensorError::NoFrameAvailable) => {
                self.reconstructor.note_missed_frame();
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Consume the freshest frame published by a background acquisition
    /// loop; never blocks.
    pub fn pump_cell(&mut self, cell: &FrameCell) -> FusionResult<bool> {
        match cell.take() {
            Some(frame) => {
                self.reconstructor.ingest(&frame)?;
                Ok(true)
            }
            None => {
                self.reconstructor.note_missed_frame();
                Ok(false)
            }
        }
    }

    /// Render one frame through the fixed pass order and merge against
    /// the live image. Fails with a pass error if no sensor frame was
    /// ever ingested.
    pub fn render(&mut self) -> FusionResult<&CompositeFrame> {
        let started = Instant::now();
        self.schedule.begin_frame();

        // Acquisition and reconstruction happened in push_frame; their
        // outputs persist across ticks, so they count as written as soon
        // as one frame was ingested.
        if self.reconstructor.history_len() > 0 {
            self.schedule.record(&ACQUIRE)?;
            self.schedule.record(&RECONSTRUCT)?;
        }

        self.schedule.record(&GBUFFER)?;
        let intrinsics = self.reconstructor.intrinsics();
        let live_color = self.reconstructor.color().clone();
        let back = GBuffer::from_sensor(
            self.reconstructor.position(),
            self.reconstructor.normal(),
            self.reconstructor.color(),
        );
        let (full, virtual_front) = compose_scene(&back, &self.objects, intrinsics);

        self.ao.begin_frame();
        self.schedule.record(&AO_FULL)?;
        self.ao
            .draw_layer(LAYER_FULL, &full.position, &full.normal, &full.albedo, intrinsics)?;
        self.schedule.record(&AO_BACK)?;
        self.ao
            .draw_layer(LAYER_SENSOR, &back.position, &back.normal, &back.albedo, intrinsics)?;
        self.schedule.record(&AO_COMBINE)?;
        self.ao.draw_combined(&live_color)?;

        self.schedule.record(&LIGHT_FULL)?;
        let full_lit = self.lighting.shade(
            &full,
            self.ao.texture_layer(LAYER_FULL)?,
            &self.environment,
            intrinsics,
        )?;
        self.schedule.record(&LIGHT_BACK)?;
        let back_lit = self.lighting.shade(
            &back,
            self.ao.texture_layer(LAYER_SENSOR)?,
            &self.environment,
            intrinsics,
        )?;

        self.schedule.record(&REFLECT_FULL)?;
        let refl_full = self.reflection.draw(
            &full.position,
            &full.normal,
            &full_lit,
            &full_lit,
            &self.irradiance,
            &self.environment,
            intrinsics,
        )?;
        let full_scene = self.reflection.compose(&full_lit, &refl_full);

        self.schedule.record(&REFLECT_BACK)?;
        let refl_back = self.reflection.draw(
            &back.position,
            &back.normal,
            &back_lit,
            &back_lit,
            &self.irradiance,
            &self.environment,
            intrinsics,
        )?;
        let back_scene = self.reflection.compose(&back_lit, &refl_back);

        self.schedule.record(&COMBINE)?;
        let composite = self.combine(&live_color, &full_scene, &back_scene, &virtual_front);

        self.full_scene = full_scene;
        self.back_scene = back_scene;
        self.virtual_front = virtual_front;
        self.reflection_aux = refl_full.aux_ao;
        self.composite = CompositeFrame {
            color: composite,
            frame_index: self.composite.frame_index + 1,
            stale: self.reconstructor.is_stale(),
        };

        debug!(
            frame = self.composite.frame_index,
            objects = self.objects.len(),
            stale = self.composite.stale,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Frame composited"
        );
        Ok(&self.composite)
    }

    /// Multiply the live image by the clamped full-to-back lighting
    /// ratio. Pixels where a virtual object is the front surface, and
    /// pixels without a valid sensor depth, show the full scene directly.
    fn combine(
        &self,
        live_color: &ColorGrid,
        full_scene: &ColorGrid,
        back_scene: &ColorGrid,
        virtual_front: &Grid<bool>,
    ) -> ColorGrid {
        let depth = self.reconstructor.filtered_depth();
        let eps = Vec3::splat(COMBINE_EPSILON);
        let mut out = Grid::new(live_color.width(), live_color.height(), Vec4::ZERO);
        for (x, y, live) in live_color.pixels() {
            let full = full_scene.get(x, y).truncate();
            let rgb = if virtual_front.get(x, y) || !depth_valid(depth.get(x, y)) {
                full
            } else {
                let back = back_scene.get(x, y).truncate();
                let ratio = ((full + eps) / (back + eps))
                    .clamp(Vec3::ZERO, Vec3::splat(COMBINE_MAX));
                live.truncate() * ratio
            };
            out.set(x, y, rgb.extend(1.0));
        }
        out
    }

    /// Place a virtual object in the scene.
    pub fn add_object(&mut self, object: VirtualObject) {
        self.objects.push(object);
    }

    pub fn clear_objects(&mut self) {
        self.objects.clear();
    }

    pub fn objects(&self) -> &[VirtualObject] {
        &self.objects
    }

    pub fn set_environment(&mut self, map: EnvironmentMap) {
        self.environment = map;
    }

    pub fn set_irradiance(&mut self, map: EnvironmentMap) {
        self.irradiance = map;
    }

    pub fn environment(&self) -> &EnvironmentMap {
        &self.environment
    }

    pub fn irradiance(&self) -> &EnvironmentMap {
        &self.irradiance
    }

    pub fn reconstructor(&self) -> &DepthReconstructor {
        &self.reconstructor
    }

    pub fn reconstructor_mut(&mut self) -> &mut DepthReconstructor {
        &mut self.reconstructor
    }

    pub fn ao(&self) -> &AmbientOcclusionPass {
        &self.ao
    }

    pub fn ao_mut(&mut self) -> &mut AmbientOcclusionPass {
        &mut self.ao
    }

    pub fn lighting(&self) -> &LightingPass {
        &self.lighting
    }

    pub fn lighting_mut(&mut self) -> &mut LightingPass {
        &mut self.lighting
    }

    pub fn reflection(&self) -> &ReflectionPass {
        &self.reflection
    }

    pub fn reflection_mut(&mut self) -> &mut ReflectionPass {
        &mut self.reflection
    }

    /// Last composited frame.
    pub fn composite(&self) -> &CompositeFrame {
        &self.composite
    }

    /// Lit full scene after reflections, from the last render.
    pub fn full_scene(&self) -> &ColorGrid {
        &self.full_scene
    }

    /// Lit back scene after reflections, from the last render.
    pub fn back_scene(&self) -> &ColorGrid {
        &self.back_scene
    }

    /// Pixels where a virtual object was the front surface.
    pub fn virtual_front(&self) -> &Grid<bool> {
        &self.virtual_front
    }

    /// Reflection hit-confidence channel for the full scene.
    pub fn reflection_aux(&self) -> &Grid<f32> {
        &self.reflection_aux
    }

    /// Effective configuration assembled from the live component state.
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            width: self.width,
            height: self.height,
            reconstruct: *self.reconstructor.settings(),
            ao: *self.ao.settings(),
            reflection: *self.reflection.settings(),
        }
    }
}
