use std::path::Path;

use bdi_core::detect::ScanResult;
use bdi_core::frame::Star;
use bdi_core::pipeline::{ReductionConfig, ReductionRun, ReductionWarning};
use console::Style;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            warning: Style::new().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn print_reduction_summary(config: &ReductionConfig, input: &Path) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("BDI Reduction"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(13)));
    println!();

    println!("  {:<14}{}", s.label.apply_to("Input"), s.path.apply_to(input.display()));
    if config.output.write_to_disk {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Output"),
            s.path.apply_to(config.output.directory.display())
        );
    } else {
        println!("  {:<14}{}", s.label.apply_to("Output"), s.warning.apply_to("in memory only"));
    }
    println!();

    println!("  {}", s.header.apply_to("Localization"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Stars"),
        s.value.apply_to(config.scan.n_stars)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Threshold"),
        s.value.apply_to(format!(
            "{} (fallback {})",
            config.localize.threshold,
            join(&config.localize.retry_thresholds)
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("FWHM"),
        s.value.apply_to(format!("{} px", config.localize.fwhm))
    );
    println!();

    println!("  {}", s.header.apply_to("Subtraction"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Stamp"),
        s.value.apply_to(format!("{0}x{0} px", 2 * config.stack.box_half_size))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Upsample"),
        s.value.apply_to(config.registration.upsample_factor)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Ranks"),
        s.value.apply_to(join(&config.klip.ranks))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Combine"),
        s.value.apply_to(format!(
            "{}\u{03c3} clipped mean, {} iter",
            config.combine.sigma, config.combine.iterations
        ))
    );
    println!();
}

pub fn print_scan_summary(result: &ScanResult, table_path: &Path) {
    let s = Styles::new();
    let rows = result.table.len();
    let failed = result.failed_rows();

    println!(
        "  {:<14}{} frames, {} usable",
        s.label.apply_to("Scanned"),
        s.value.apply_to(rows),
        s.value.apply_to(rows - failed)
    );
    println!("  {:<14}{}", s.label.apply_to("Table"), s.path.apply_to(table_path.display()));
}

pub fn print_run_result(run: &ReductionRun) {
    let s = Styles::new();

    println!();
    println!("  {:<14}{}", s.label.apply_to("Dataset"), s.value.apply_to(&run.dataset));
    if run.stacked_planes < run.expected_planes {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Stacked"),
            s.warning.apply_to(format!(
                "{} of {} planes",
                run.stacked_planes, run.expected_planes
            ))
        );
    } else {
        println!(
            "  {:<14}{} planes",
            s.label.apply_to("Stacked"),
            s.value.apply_to(run.stacked_planes)
        );
    }
    for star in [Star::A, Star::B] {
        let cube = run.output.cube(star);
        let (k, h, w) = cube.mean.dim();
        println!(
            "  {:<14}{}",
            s.label.apply_to(format!("Star {star}")),
            s.value.apply_to(format!("{k} ranks, {w}x{h} px"))
        );
    }
    for path in &run.written {
        println!("  {:<14}{}", s.label.apply_to("Wrote"), s.path.apply_to(path.display()));
    }
}

pub fn print_warnings(warnings: &[ReductionWarning]) {
    if warnings.is_empty() {
        return;
    }
    let s = Styles::new();
    println!();
    println!("  {}", s.header.apply_to(format!("Warnings ({})", warnings.len())));
    for warning in warnings {
        println!("    {}", s.warning.apply_to(warning));
    }
}
