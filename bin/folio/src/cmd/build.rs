//! Build command - runs the orchestrator over every language variant

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, bail};
use folio_core::{BuildOverrides, Config};
use folio_generator::{BuildReport, Builder, CancelToken};

use super::check::quick_validate;

/// Directory holding the configuration file; content, theme and output paths resolve against it.
pub fn project_root(config_path: &Path) -> &Path {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Run the build command.
pub fn run(config_path: &Path, overrides: BuildOverrides) -> Result<()> {
    tracing::info!(?config_path, ?overrides, "Starting build");

    let config = Config::load_with_env(config_path).wrap_err("Failed to load configuration")?;

    let warnings = quick_validate(&config, project_root(config_path));
    if !warnings.is_empty() {
        println!();
        println!("  Warnings:");
        for warn in &warnings {
            println!("  ⚠ {warn}");
        }
        println!();
    }

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("Cancellation requested, stopping after the current page");
        handler.cancel();
    })
    .wrap_err("Failed to install Ctrl-C handler")?;

    let result = Builder::new(config, project_root(config_path))
        .with_overrides(overrides)
        .with_cancel_token(cancel)
        .build();

    let report = match result {
        Ok(report) => report,
        Err(err) if err.is_cancelled() => {
            bail!("Build cancelled; output and cache may be stale, rebuild with --force")
        }
        Err(err) => return Err(err).wrap_err("Build failed"),
    };

    print_report(&report);
    tracing::info!(
        rendered = report.rendered(),
        skipped = report.skipped(),
        duration_ms = report.duration_ms,
        "Build completed successfully"
    );

    Ok(())
}

fn print_report(report: &BuildReport) {
    println!();
    println!("  Build completed successfully!");
    println!();
    for variant in &report.variants {
        let language = variant.language.as_deref().unwrap_or("default");
        println!(
            "  [{language}] pages: {:>4}  rendered: {:>4}  skipped: {:>4}  pruned: {:>3}",
            variant.total_pages(),
            variant.rendered,
            variant.skipped,
            variant.pruned
        );
        for (reason, count) in &variant.reasons {
            println!("         {reason}: {count}");
        }
        let failed = variant.plugins.iter().filter(|p| !p.success).count();
        if failed > 0 {
            println!("         ⚠ {failed} plugin hook(s) failed");
        }
    }
    for artifact in &report.root_artifacts {
        println!("  Root artifact: {}", artifact.display());
    }
    println!();
    println!("  Content:    {}", report.content_items);
    println!("  Duration:   {:.2}s", report.duration_ms as f64 / 1000.0);
    println!("  Output:     {}", report.output_dir.display());
    println!();
}
