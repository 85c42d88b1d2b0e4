use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use dvbscan::context::Cli;
use dvbscan::demux::LinuxDemux;
use dvbscan::initial::read_initial;
use dvbscan::output::dump_lists;
use dvbscan::tuner::LinuxFrontend;
use dvbscan::{ScanConfig, ScanOutcome, ScanSession};
use dvbscan_si::SpectralInversion;
use log::{debug, error, info, warn};

fn run(
    cli: &Cli,
    mut config: ScanConfig,
    interrupted: Arc<AtomicBool>,
) -> dvbscan::Result<ScanOutcome> {
    let initial = match &cli.initial {
        Some(path) => Some(read_initial(path)?),
        None => None,
    };

    // Only read access is needed when nothing will be tuned.
    let frontend = LinuxFrontend::open(
        config.adapter,
        config.frontend,
        config.current_tp_only,
        config.lnb,
    )?;
    if config.inversion == SpectralInversion::Auto && !frontend.can_inversion_auto() {
        info!("Frontend can not do INVERSION_AUTO, trying INVERSION_OFF instead");
        config.inversion = SpectralInversion::Off;
    }

    let demux = LinuxDemux::new(config.adapter, config.demux);
    debug!("using demux {}", demux.path().display());

    let mut session = ScanSession::new(demux, frontend, config.clone(), interrupted);
    let result = match initial {
        Some(list) => session.scan_network(&list),
        None => session.scan_current(),
    };
    match &result {
        Ok(ScanOutcome::Completed) => {}
        Ok(ScanOutcome::Interrupted) => warn!("scan interrupted, dumping what was found so far"),
        Err(e) => error!("scan aborted ({}), dumping what was found so far", e),
    }

    // Whatever was collected is written even when the scan failed.
    let mut network = session.into_network();
    dump_lists(&mut network, &config, &mut io::stdout().lock())?;
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let config = match cli.scan_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!("cannot install signal handler: {}", e);
    }

    match run(&cli, config, interrupted) {
        Ok(ScanOutcome::Completed) => ExitCode::SUCCESS,
        Ok(ScanOutcome::Interrupted) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}
