//! Manual smoke-test binary: binds a Coordinator under `--state-dir` and
//! logs strand registrations as they arrive.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use squidcore::ipc::coordinator::Coordinator;

#[derive(Parser)]
struct Args {
    /// Directory holding coordinator.ipc and kid-<N>.ipc sockets.
    #[arg(long)]
    state_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    std::fs::create_dir_all(&args.state_dir)?;

    let mut coordinator = Coordinator::bind(&args.state_dir)?;
    log::info!("coordinator listening in {}", args.state_dir.display());

    loop {
        coordinator.sweep_expired_searches()?;
        let handled = coordinator.poll_once(|params| {
            log::warn!("refusing to actually open a listener for {params:?} in the demo");
            Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
        })?;
        if !handled {
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}
