mod report;

use std::net::IpAddr;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use log::*;
use mocap_transport::{
    ActorTracker, EndpointSpec, FrameChannel, HeaderFormat, SessionConfig, SessionRegistry,
    SessionState,
};

use report::FrameReport;

const TICK: Duration = Duration::from_millis(100);

/// Receives a motion-capture stream and logs what arrives.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Connect to a TCP server at host:port
    #[arg(long, conflicts_with = "udp", required_unless_present = "udp")]
    tcp: Option<String>,

    /// Bind a UDP port
    #[arg(long)]
    udp: Option<u16>,

    /// Accept UDP datagrams from this address only
    #[arg(long, requires = "udp")]
    peer: Option<IpAddr>,

    /// Header family of the stream (calc or bvh)
    #[arg(long, default_value = "calc")]
    format: HeaderFormat,

    /// Stop after this many seconds; runs until the connection drops if unset
    #[arg(long)]
    duration: Option<u64>,

    /// Seconds between statistics reports
    #[arg(long, default_value = "1")]
    report_secs: u64,

    /// Milliseconds without frames before an avatar is reported missing
    #[arg(long, default_value = "1000")]
    suspend_ms: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let spec = match (&args.tcp, args.udp) {
        (Some(target), _) => match EndpointSpec::tcp(target) {
            Ok(spec) => spec,
            Err(e) => {
                error!("{e}");
                process::exit(2);
            }
        },
        (None, Some(port)) => EndpointSpec::Udp {
            port,
            peer: args.peer,
        },
        (None, None) => unreachable!("clap requires --tcp or --udp"),
    };

    let registry = SessionRegistry::with_config(SessionConfig::new().with_format(args.format));

    let (channel, frames) = FrameChannel::bounded(1024);
    let channel = Arc::new(channel);
    registry.observers().add_shared(channel.clone());

    let tracker = Arc::new(ActorTracker::new(Duration::from_millis(args.suspend_ms)));
    tracker.on_suspend(|status| warn!("No frame data from {} ({})", status.key, status.header.avatar_name));
    tracker.on_resume(|status| info!("Frame data resumed from {} ({})", status.key, status.header.avatar_name));
    registry.observers().add_shared(tracker.clone());

    info!("Opening {} ({} headers)...", spec.endpoint(), args.format);
    let id = match registry.open(spec) {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to open session: {e}");
            process::exit(1);
        }
    };
    let session = match registry.get(id) {
        Ok(session) => session,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };
    info!("Receiving from {}", session.endpoint());

    let start = Instant::now();
    let deadline = args.duration.map(|secs| start + Duration::from_secs(secs));
    let mut report = FrameReport::new(Duration::from_secs(args.report_secs.max(1)), start);

    loop {
        match frames.recv_timeout(TICK) {
            Ok(received) => report.record(&received.frame),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        tracker.poll(now);
        report.maybe_report(now, &session.stats());

        if deadline.is_some_and(|deadline| now >= deadline) {
            info!("Duration elapsed");
            break;
        }
        if session.state() == SessionState::Closed && frames.is_empty() {
            warn!("Session closed by the remote side");
            break;
        }
    }

    registry.close(id);

    let stats = session.stats();
    let elapsed = start.elapsed();
    info!("=== Receive Complete ===");
    info!("Total frames: {}", report.total_frames());
    info!("Total received: {} KB", stats.bytes_received / 1024);
    info!("Framing errors: {} ({} bytes discarded)", stats.framing_errors, stats.bytes_discarded);
    info!("Dropped by consumer: {}", channel.dropped());
    info!("Time: {:.2} seconds", elapsed.as_secs_f64());
    info!(
        "Rate: {:.1} frames/s",
        report.total_frames() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
}
