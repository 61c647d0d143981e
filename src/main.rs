use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use surface_clusters::cli::Cli;
use surface_clusters::config::RunConfig;
use surface_clusters::engine::{AreaCorrection, ClusterStatisticsEngine};
use surface_clusters::io::{load_mesh, save_label_table, save_scalar_table};
use surface_clusters::table::{ReportSink, WriterSink};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }
}

fn report_sink(config: &RunConfig) -> Result<Box<dyn ReportSink>> {
    match &config.output.report {
        Some(path) => {
            let path = config.resolve(path);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create report {}", path.display()))?;
            Ok(Box::new(WriterSink::new(BufWriter::new(file))))
        }
        None => Ok(Box::new(WriterSink::new(io::stdout()))),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = RunConfig::from_toml(&cli.config)?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let mesh = load_mesh(config.resolve(&config.mesh.path))?;
    let computer = config.build_computer(&mesh)?;
    let distortion = config.load_area_correction()?;

    let mut engine = ClusterStatisticsEngine::new(computer.as_ref(), &mesh, config.engine_config());
    if let Some((table, column, mode)) = &distortion {
        engine = engine.with_area_correction(AreaCorrection {
            table,
            column: *column,
            mode: *mode,
        });
    }
    if cli.progress {
        engine = engine.with_progress(|message, completed, total| {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "{}: {}/{}", message, completed, total);
        });
    }

    let mut sink = report_sink(&config)?;
    let outcome = engine.execute(sink.as_mut())?;
    sink.flush().context("Failed to flush report")?;

    if let Some(path) = &config.output.labels {
        save_label_table(config.resolve(path), &outcome.labels)?;
    }
    if let Some(path) = &config.output.statistics {
        save_scalar_table(config.resolve(path), &outcome.statistics)?;
    }
    if let Some(path) = &config.output.clusters {
        save_scalar_table(config.resolve(path), &outcome.cluster_table)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    run(&cli)
}
