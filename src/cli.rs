// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for the demo pipeline
//!
//! This module provides command-line functionality for:
//! - Rendering the synthetic scene through the full compositing pipeline
//! - Dumping intermediate buffers as PNG and raw data
//! - Inspecting the effective configuration

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use arfuse::compositor::DifferentialCompositor;
use arfuse::config::PipelineConfig;
use arfuse::constants::build_info;
use arfuse::passes::gbuffer::VirtualObject;
use arfuse::sensor::{AcquisitionLoop, SyntheticSensor};
use arfuse::viz;
use chrono::Local;
use glam::Vec3;

pub struct RunOptions {
    pub frames: u32,
    pub width: u32,
    pub height: u32,
    pub out_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub dump_raw: bool,
    pub background: bool,
}

/// Render the synthetic demo scene and write per-stage image dumps.
pub fn run_demo(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(options.config.as_deref())?;
    config.width = options.width;
    config.height = options.height;

    let out_dir = options
        .out_dir
        .unwrap_or_else(|| PathBuf::from("arfuse-out"));
    std::fs::create_dir_all(&out_dir)?;

    let mut compositor = DifferentialCompositor::new(config)?;
    // One virtual sphere resting between the synthetic sphere and the wall.
    compositor.add_object(VirtualObject::Sphere {
        center: Vec3::new(0.02, -0.035, -0.14),
        radius: 0.025,
        albedo: Vec3::new(0.85, 0.30, 0.25),
    });

    println!(
        "Rendering {} frames at {}x{}",
        options.frames, options.width, options.height
    );
    println!("Output directory: {}", out_dir.display());

    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let sensor = SyntheticSensor::new(options.width, options.height, 42);
    let started = Instant::now();

    if options.background {
        let mut acquisition =
            AcquisitionLoop::start("synthetic", sensor, Duration::from_millis(5));
        let cell = acquisition.cell();
        let mut rendered = 0u32;
        while rendered < options.frames {
            if !compositor.pump_cell(&cell)? {
                if !acquisition.is_running() {
                    return Err("acquisition loop ended early".into());
                }
                std::thread::sleep(Duration::from_millis(2));
                continue;
            }
            compositor.render()?;
            save_composite(&compositor, &out_dir, &stamp, rendered)?;
            rendered += 1;
        }
        acquisition.stop();
    } else {
        let mut sensor = sensor;
        for index in 0..options.frames {
            compositor.pump(&mut sensor)?;
            compositor.render()?;
            save_composite(&compositor, &out_dir, &stamp, index)?;
        }
    }

    save_buffers(&compositor, &out_dir, &stamp, options.dump_raw)?;

    let elapsed = started.elapsed();
    println!(
        "Rendered {} frames in {:.2}s ({:.1} ms/frame)",
        options.frames,
        elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1000.0 / options.frames.max(1) as f64
    );

    Ok(())
}

/// Print the effective configuration as pretty JSON.
pub fn print_info(config: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config.as_deref())?;
    println!("arfuse {}", build_info::version());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let config = PipelineConfig::load(path)?;
            println!("Loaded configuration: {}", path.display());
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn save_composite(
    compositor: &DifferentialCompositor,
    out_dir: &Path,
    stamp: &str,
    index: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let frame = compositor.composite();
    let path = out_dir.join(format!("composite_{stamp}_{index:04}.png"));
    save_png(
        &path,
        frame.color.width() as u32,
        frame.color.height() as u32,
        &viz::color_to_rgba8(&frame.color),
    )
}

/// Dump the intermediate buffers of the last rendered frame.
fn save_buffers(
    compositor: &DifferentialCompositor,
    out_dir: &Path,
    stamp: &str,
    dump_raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let reconstructor = compositor.reconstructor();
    let depth = reconstructor.filtered_depth();
    let (w, h) = (depth.width() as u32, depth.height() as u32);

    save_png(
        &out_dir.join(format!("depth_{stamp}.png")),
        w,
        h,
        &viz::depth_to_rgba8(depth),
    )?;
    save_png(
        &out_dir.join(format!("depth_bands_{stamp}.png")),
        w,
        h,
        &viz::depth_bands_rgba8(depth),
    )?;
    save_png(
        &out_dir.join(format!("depth_eq_{stamp}.png")),
        w,
        h,
        &viz::scalar_to_rgba8(&viz::equalized_brightness(depth)),
    )?;
    save_png(
        &out_dir.join(format!("occlusion_{stamp}.png")),
        w,
        h,
        &viz::scalar_to_rgba8(compositor.ao().combined()),
    )?;
    save_png(
        &out_dir.join(format!("reflection_aux_{stamp}.png")),
        w,
        h,
        &viz::scalar_to_rgba8(compositor.reflection_aux()),
    )?;
    save_png(
        &out_dir.join(format!("full_scene_{stamp}.png")),
        w,
        h,
        &viz::color_to_rgba8(compositor.full_scene()),
    )?;
    save_png(
        &out_dir.join(format!("back_scene_{stamp}.png")),
        w,
        h,
        &viz::color_to_rgba8(compositor.back_scene()),
    )?;

    if dump_raw {
        let path = out_dir.join(format!("depth_{stamp}.f32"));
        std::fs::write(&path, bytemuck::cast_slice::<f32, u8>(depth.data()))?;
        println!("Raw depth: {}", path.display());
    }

    Ok(())
}

fn save_png(
    path: &Path,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let image = image::RgbaImage::from_raw(width, height, rgba.to_vec())
        .ok_or("image buffer size mismatch")?;
    image.save(path)?;
    Ok(())
}
