// PET Acquisition Simulator CLI
//
// This binary runs a full simulated acquisition: decay generation, photon
// transport, detection, coincidence sorting, and sinogram binning. Output
// is a directory of per-interval list-mode files, per-slice sinograms,
// and a manifest.json describing the run.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use pet_acquisition::{
    run_acquisition, AcquisitionConfig, Material, Phantom, ScannerGeometry, TransportMode,
};

/// CLI arguments for the acquisition simulator
#[derive(Parser, Debug)]
#[command(name = "acquire")]
#[command(about = "Simulate a PET scanner acquisition run", long_about = None)]
struct Args {
    /// Total acquisition time in seconds
    #[arg(short, long, default_value_t = 0.5)]
    time: f64,

    /// Processing interval length in seconds
    #[arg(short, long, default_value_t = 0.05)]
    interval: f64,

    /// Source activity in MBq at the start of the run
    #[arg(short, long, default_value_t = 100.0)]
    activity: f64,

    /// Isotope half-life in seconds
    #[arg(long, default_value_t = 6400.0)]
    half_life: f64,

    /// Coincidence window in nanoseconds
    #[arg(short, long, default_value_t = 10)]
    window: u32,

    /// Phantom shape: "cylinder" (uniform volume) or "line" (offset rod)
    #[arg(short, long, default_value = "cylinder")]
    phantom: String,

    /// Phantom radius in mm (cylinder radius, or rod offset for "line")
    #[arg(long, default_value_t = 100.0)]
    phantom_radius: f64,

    /// Phantom length in mm
    #[arg(long, default_value_t = 300.0)]
    phantom_length: f64,

    /// Phantom material: "vacuum", "water", or "custom"
    #[arg(short, long, default_value = "vacuum")]
    material: String,

    /// Scattering coefficient in 1/mm (only with --material custom)
    #[arg(long, default_value_t = 0.0095)]
    mu_scatter: f64,

    /// Absorption coefficient in 1/mm (only with --material custom)
    #[arg(long, default_value_t = 0.0001)]
    mu_absorb: f64,

    /// Transport mode: "analog" or "roulette"
    #[arg(long, default_value = "analog")]
    mode: String,

    /// Roulette survival probability in (0, 1] (roulette mode only)
    #[arg(long, default_value_t = 0.1)]
    survival: f64,

    /// Transport energy cutoff as a fraction of 511 keV
    #[arg(long, default_value_t = 0.5)]
    cutoff: f64,

    /// Transaxial mashing factor for sinogram binning
    #[arg(long, default_value_t = 2)]
    det_mash: u32,

    /// Axial mashing factor for sinogram binning
    #[arg(long, default_value_t = 1)]
    ring_mash: u32,

    /// Master seed; omit for a fresh random run
    #[arg(short, long)]
    seed: Option<u64>,

    /// Worker thread count; omit to let the pool size itself
    #[arg(long)]
    threads: Option<usize>,

    /// Output directory for list-mode files and sinograms
    #[arg(short, long, default_value = "out/acquisition")]
    output: PathBuf,

    /// Skip the PNG sinogram previews (binary sinograms are always written)
    #[arg(long, default_value_t = false)]
    no_png: bool,
}

/// Parse the phantom shape from its name
fn parse_phantom(shape: &str, radius_mm: f64, length_mm: f64) -> Result<Phantom, String> {
    if !(length_mm > 0.0) {
        return Err(format!("Invalid phantom length: {} mm", length_mm));
    }
    match shape {
        "cylinder" => {
            if !(radius_mm > 0.0) {
                return Err(format!("Invalid phantom radius: {} mm", radius_mm));
            }
            Ok(Phantom::cylinder(radius_mm, length_mm))
        }
        "line" => {
            if !(radius_mm >= 0.0) {
                return Err(format!("Invalid rod offset: {} mm", radius_mm));
            }
            Ok(Phantom::line(radius_mm, length_mm))
        }
        _ => Err(format!(
            "Invalid phantom: '{}'. Must be one of: cylinder, line",
            shape
        )),
    }
}

/// Parse the phantom material from its name
fn parse_material(name: &str, mu_scatter: f64, mu_absorb: f64) -> Result<Material, String> {
    match name {
        "vacuum" => Ok(Material::vacuum()),
        "water" => Ok(Material::water()),
        "custom" => {
            if mu_scatter < 0.0 || mu_absorb < 0.0 {
                return Err("Material coefficients must be non-negative".to_string());
            }
            Ok(Material::new(mu_scatter, mu_absorb))
        }
        _ => Err(format!(
            "Invalid material: '{}'. Must be one of: vacuum, water, custom",
            name
        )),
    }
}

/// Parse the transport mode from its name
fn parse_mode(name: &str, survival: f64) -> Result<TransportMode, String> {
    match name {
        "analog" => Ok(TransportMode::analog()),
        "roulette" => {
            if !(survival > 0.0 && survival <= 1.0) {
                return Err(format!(
                    "Invalid survival: {}. Must be in (0, 1]",
                    survival
                ));
            }
            Ok(TransportMode::roulette(survival))
        }
        _ => Err(format!(
            "Invalid mode: '{}'. Must be one of: analog, roulette",
            name
        )),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let args = Args::parse();

    let phantom = parse_phantom(&args.phantom, args.phantom_radius, args.phantom_length)
        .map_err(|e| e.to_string())?;
    let material = parse_material(&args.material, args.mu_scatter, args.mu_absorb)
        .map_err(|e| e.to_string())?;
    let mode = parse_mode(&args.mode, args.survival).map_err(|e| e.to_string())?;

    let config = AcquisitionConfig {
        geometry: ScannerGeometry::default(),
        phantom,
        material,
        mode,
        cutoff_fraction: args.cutoff,
        total_time_s: args.time,
        interval_s: args.interval,
        activity_bq: args.activity * 1.0e6,
        half_life_s: args.half_life,
        coincidence_window_ns: args.window,
        det_mash: args.det_mash,
        ring_mash: args.ring_mash,
        seed: args.seed,
        threads: args.threads,
    };

    let g = config.geometry;

    // Print configuration
    println!("\nPET Acquisition Simulator");
    println!("=======================================");
    println!(
        "  Scanner: {} blocks x {} block rings, {:.0} mm radius",
        g.blocks, g.block_rings, g.radius_mm
    );
    println!(
        "  Crystals: {}x{} per block, {} transaxial, {} rings",
        g.crystals_per_block,
        g.crystals_per_block,
        g.transaxial_crystals(),
        g.crystal_rings()
    );
    println!(
        "  Phantom: {} (r={:.0} mm, l={:.0} mm)",
        phantom.name(),
        args.phantom_radius,
        args.phantom_length
    );
    println!(
        "  Material: mu_scatter={:.4} 1/mm, mu_absorb={:.4} 1/mm",
        material.mu_scatter, material.mu_absorb
    );
    println!(
        "  Transport: {} (cutoff {:.0} keV)",
        mode.name(),
        config.cutoff_kev()
    );
    println!(
        "  Activity: {:.1} MBq, half-life {:.0} s",
        args.activity, args.half_life
    );
    println!(
        "  Time: {:.2} s in {} intervals of {:.2} s",
        args.time,
        config.intervals(),
        args.interval
    );
    println!(
        "  Coincidence window: {} ns, mashing {}x{}",
        args.window, args.det_mash, args.ring_mash
    );
    println!("=======================================\n");

    // Create progress bar over the processing intervals
    let pb = ProgressBar::new(config.intervals() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} intervals ({percent}%)")?
            .progress_chars("█▓▒░ "),
    );

    println!("Tracing photons...");
    let report = run_acquisition(&config, &args.output, !args.no_png, |done| {
        pb.set_position(done as u64);
    })?;
    pb.finish_with_message("✓ Acquisition complete");

    // Print statistics
    println!("\n📊 Statistics:");
    println!("  Seed: {}", report.seed);
    println!("  Decays: {}", report.stats.decays);
    println!(
        "  Photons: {} escaped, {} absorbed",
        report.stats.escaped, report.stats.absorbed
    );
    println!("  Detected singles: {}", report.stats.detected);
    println!(
        "  Scatter fraction: {:.3}",
        report.stats.scatter_fraction()
    );
    println!("  Coincidences: {}", report.stats.coincidences);
    println!(
        "  Binned: {} into {} michelogram slices",
        report.stats.binned, report.slice_count
    );

    println!("\n✨ Acquisition complete!");
    println!("📁 Output: {}\n", args.output.display());

    Ok(())
}
