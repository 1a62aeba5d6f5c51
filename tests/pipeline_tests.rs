// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end tests driving the full pipeline through the public API

use arfuse::buffers::depth_valid;
use arfuse::passes::gbuffer::VirtualObject;
use arfuse::sensor::SyntheticSensor;
use arfuse::{DifferentialCompositor, PipelineConfig};
use glam::Vec3;

/// Small, fast settings for CPU test runs.
fn test_config(width: u32, height: u32) -> PipelineConfig {
    let mut config = PipelineConfig {
        width,
        height,
        ..PipelineConfig::default()
    };
    config.reconstruct.blur_kernel_radius = 4;
    config.reconstruct.fill_passes = 3;
    config.ao.samples = 8;
    config.ao.kernel_radius = 0.02;
    config.ao.blur_kernel_radius = 3;
    config.reflection.max_steps = 40;
    config.reflection.max_mip_levels = 3;
    config.reflection.gaussian_kernel_radius = 2;
    config
}

#[test]
fn test_noisy_stream_reproduces_live_image_exactly() {
    // With no virtual objects both scene renders see identical inputs,
    // so the lighting ratio is exactly one at every covered pixel no
    // matter how noisy the depth stream is.
    let mut compositor = DifferentialCompositor::new(test_config(64, 48)).unwrap();
    let mut sensor = SyntheticSensor::new(64, 48, 11).with_noise(25.0, 0.0);

    for _ in 0..5 {
        assert!(compositor.pump(&mut sensor).unwrap());
        compositor.render().unwrap();

        let composite = compositor.composite().color.clone();
        let live = compositor.reconstructor().color();
        for (x, y, live_px) in live.pixels() {
            assert_eq!(
                composite.get(x, y).truncate(),
                live_px.truncate(),
                "pixel ({x}, {y})"
            );
        }
    }
}

#[test]
fn test_sensor_holes_fall_back_to_full_scene() {
    // Heavy dropout with a weak hole fill leaves pixels without a
    // reconstructed depth; those must show the rendered scene, while
    // covered pixels still show the live image untouched.
    let mut config = test_config(48, 36);
    config.reconstruct.tmf_kernel_radius = 0;
    config.reconstruct.fill_kernel_radius = 1;
    config.reconstruct.fill_passes = 1;
    let mut compositor = DifferentialCompositor::new(config).unwrap();
    let mut sensor = SyntheticSensor::new(48, 36, 5).with_noise(0.0, 0.95);

    compositor.pump(&mut sensor).unwrap();
    compositor.render().unwrap();

    let composite = compositor.composite().color.clone();
    let full = compositor.full_scene().clone();
    let live = compositor.reconstructor().color().clone();
    let depth = compositor.reconstructor().filtered_depth();

    let mut holes = 0usize;
    for (x, y, d) in depth.pixels() {
        if depth_valid(d) {
            assert_eq!(
                composite.get(x, y).truncate(),
                live.get(x, y).truncate(),
                "covered pixel ({x}, {y})"
            );
        } else {
            holes += 1;
            assert_eq!(
                composite.get(x, y).truncate(),
                full.get(x, y).truncate(),
                "hole pixel ({x}, {y})"
            );
        }
    }
    assert!(holes > 0, "dropout should leave unreconstructed pixels");
}

#[test]
fn test_composite_is_deterministic_across_runs() {
    // Identical configs and identically seeded streams must produce
    // byte-identical composites, including jittered reflections.
    let scene = VirtualObject::Sphere {
        center: Vec3::new(0.0, 0.0, -0.12),
        radius: 0.02,
        albedo: Vec3::new(0.9, 0.2, 0.2),
    };

    let mut a = DifferentialCompositor::new(test_config(48, 36)).unwrap();
    let mut b = DifferentialCompositor::new(test_config(48, 36)).unwrap();
    a.add_object(scene);
    b.add_object(scene);

    let mut sensor_a = SyntheticSensor::new(48, 36, 17).with_noise(10.0, 0.1);
    let mut sensor_b = SyntheticSensor::new(48, 36, 17).with_noise(10.0, 0.1);

    for _ in 0..3 {
        a.pump(&mut sensor_a).unwrap();
        b.pump(&mut sensor_b).unwrap();
        a.render().unwrap();
        b.render().unwrap();
        assert_eq!(a.composite().color.data(), b.composite().color.data());
        assert_eq!(a.reflection_aux().data(), b.reflection_aux().data());
    }
}

#[test]
fn test_dropped_captures_leave_composite_stale() {
    // Every second capture fails; the compositor keeps rendering from
    // the last reconstruction and flags the result.
    let mut compositor = DifferentialCompositor::new(test_config(32, 24)).unwrap();
    let mut sensor = SyntheticSensor::new(32, 24, 3).with_noise(0.0, 0.0).with_drop_every(2);

    assert!(compositor.pump(&mut sensor).unwrap());
    assert!(!compositor.render().unwrap().stale);

    assert!(!compositor.pump(&mut sensor).unwrap());
    let frame = compositor.render().unwrap();
    assert!(frame.stale);
    assert_eq!(frame.frame_index, 2);

    assert!(compositor.pump(&mut sensor).unwrap());
    assert!(!compositor.render().unwrap().stale);
}

#[test]
fn test_debug_views_match_output_resolution() {
    let mut compositor = DifferentialCompositor::new(test_config(32, 24)).unwrap();
    let mut sensor = SyntheticSensor::new(32, 24, 9).with_noise(0.0, 0.0);
    compositor.pump(&mut sensor).unwrap();
    compositor.render().unwrap();

    let bytes = 32 * 24 * 4;
    assert_eq!(arfuse::viz::color_to_rgba8(&compositor.composite().color).len(), bytes);
    assert_eq!(
        arfuse::viz::depth_to_rgba8(compositor.reconstructor().filtered_depth()).len(),
        bytes
    );
    assert_eq!(
        arfuse::viz::depth_bands_rgba8(compositor.reconstructor().filtered_depth()).len(),
        bytes
    );

    let equalized = arfuse::viz::equalized_brightness(compositor.reconstructor().filtered_depth());
    assert_eq!((equalized.width(), equalized.height()), (32, 24));
}

#[test]
fn test_default_config_is_reported_back() {
    // The effective config assembled from the live passes matches what
    // the compositor was built with.
    let config = test_config(48, 36);
    let compositor = DifferentialCompositor::new(config.clone()).unwrap();
    assert_eq!(compositor.config(), config);
}
