use anyhow::Context;
use clap::Parser;
use env_logger::Builder;
use log::{warn, LevelFilter};
use ssrflank::process::remove_registered_scratch;
use ssrflank::{run_pipeline, Args, PipelineConfig};
use tokio::runtime::Builder as RuntimeBuilder;

fn main() -> anyhow::Result<()> {
    // Usage errors exit 1; --help and --version exit 0.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Builder::new().filter_level(level).parse_default_env().init();

    spawn_interrupt_handler();

    let config = PipelineConfig::from_args(&args).context("invalid arguments")?;
    let summary = run_pipeline(&config)
        .with_context(|| format!("SSR search failed for {}", config.genome.display()))?;
    summary.print();
    Ok(())
}

/// Ctrl-C ends the run with status 0 after a best-effort scratch cleanup.
fn spawn_interrupt_handler() {
    std::thread::spawn(|| {
        let runtime = match RuntimeBuilder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                warn!("Interrupt handler unavailable: {}", e);
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("User interrupt");
                remove_registered_scratch();
                std::process::exit(0);
            }
        });
    });
}
