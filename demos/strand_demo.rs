//! Manual smoke-test binary: registers a strand against a Coordinator
//! already running under `--state-dir` and logs every frame it receives.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use squidcore::ipc::{Frame, KidId, PortHandler, Strand};

#[derive(Parser)]
struct Args {
    /// Directory holding coordinator.ipc and kid-<N>.ipc sockets.
    #[arg(long)]
    state_dir: PathBuf,

    /// This strand's kid id.
    #[arg(long)]
    kid_id: u32,

    /// Optional tag this strand registers under (matched by FindStrand).
    #[arg(long)]
    tag: Option<String>,
}

struct LoggingHandler;

impl PortHandler for LoggingHandler {
    fn receive(&mut self, frame: Frame) {
        log::info!("strand received frame of type {:?}", frame.message_type());
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let strand = Strand::register(&args.state_dir, KidId(args.kid_id), args.tag.as_deref())?;
    log::info!("kid{} registered, entering receive loop", args.kid_id);

    let mut handler = LoggingHandler;
    strand.run(&mut handler, || false, Duration::from_millis(100))?;
    Ok(())
}
