//! pandump: capture CAN traffic relayed by a panda device into candump and
//! SavvyCAN files

use clap::Parser;
use cli_log::*;
use pandump::dump::{DumpFormat, DumpWriter};
use pandump::subscription::SubscriptionSet;
use pandump_io::IdSource;
use pandump_io::capture::Capture;
use pandump_io::clock::SystemClock;
use pandump_io::dbc::DbcFile;
use pandump_io::ids::IdList;
use pandump_io::link::{DeviceLink, LinkConfig};
use pandump_io::transport::UdpConnector;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Address of the panda device
    #[arg(long, default_value = "192.168.4.1")]
    host: String,

    /// UDP port of the panda device
    #[arg(short, long, default_value = "1338")]
    port: u16,

    /// Directory the dumps are written under
    #[arg(short, long, default_value = "candumps")]
    output: PathBuf,

    /// DBC file listing the CAN ids to subscribe to
    #[arg(long)]
    dbc: Option<String>,

    /// CAN ids to subscribe to, e.g. 0x152,0x3e9,0x100-0x10f
    #[arg(long)]
    ids: Option<String>,

    /// Output formats (candump, savvycan)
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_values = ["candump", "savvycan"]
    )]
    format: Vec<DumpFormat>,

    /// Seconds without data before reconnecting
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Seconds to back off after repeated connection failures
    #[arg(long, default_value = "120")]
    cooldown: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    init_cli_log!("pandump");
    let args = Args::parse();

    let subscription = subscription(&args)?;

    fs::create_dir_all(&args.output).map_err(|e| {
        format!("cannot create {}: {e}", args.output.display())
    })?;

    let mut writers: Vec<DumpWriter> = vec![];
    for format in args.format.iter() {
        if writers.iter().all(|w| w.format() != *format) {
            writers.push(DumpWriter::new(*format, &args.output));
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let shutdown = Arc::clone(&shutdown);
        move || shutdown.store(true, Ordering::SeqCst)
    })?;

    let config = LinkConfig::default()
        .timeout(Duration::from_secs(args.timeout))
        .cooldown(Duration::from_secs(args.cooldown));
    let connector = UdpConnector::resolve(&args.host, args.port)?;
    let clock = SystemClock::new();
    let link = DeviceLink::connect(connector, clock, config, subscription)?
        .with_shutdown(shutdown);

    let formats: Vec<String> =
        writers.iter().map(|w| w.format().to_string()).collect();
    info!(
        "Capturing from {}:{} into {} ({})",
        args.host,
        args.port,
        args.output.display(),
        formats.join(", ")
    );
    eprintln!(
        "Capturing from {}:{} into {} ({}). Press Ctrl+C to stop.",
        args.host,
        args.port,
        args.output.display(),
        formats.join(", ")
    );

    let mut capture = Capture::new(link, writers);
    let summary = capture.run()?;

    info!("Capture finished: {:?}", summary);
    eprintln!(
        "Captured {} frames in {} batches ({} write errors)",
        summary.frames, summary.batches, summary.write_errors
    );
    Ok(())
}

/// Build the subscription from the id list, or the DBC file when no list is
/// given
fn subscription(args: &Args) -> Result<SubscriptionSet, Box<dyn Error>> {
    let list = IdList::parse(args.ids.as_deref().unwrap_or(""))?;

    let source: Option<Box<dyn IdSource>> = if !list.is_empty() {
        if args.dbc.is_some() {
            warn!("DBC file is not used when an id list is given, ignoring it");
        }
        Some(Box::new(list))
    } else if let Some(dbc) = args.dbc.as_deref() {
        Some(Box::new(DbcFile::open(dbc)?))
    } else {
        None
    };

    match source {
        Some(source) => {
            let set = SubscriptionSet::from_ids(source.ids());
            info!(
                "Subscribing to {} CAN ids from {}",
                set.len(),
                source.name()
            );
            Ok(set)
        }
        None => {
            warn!(
                "No id list or DBC file, \
                 using the device's default subscription"
            );
            Ok(SubscriptionSet::new())
        }
    }
}
