mod motion;
mod sim_server;

use std::net::{SocketAddr, ToSocketAddrs};
use std::process;

use clap::Parser;
use log::*;
use mocap_transport::HeaderFormat;

use motion::MotionGenerator;
use sim_server::{ServerTarget, SimServer};

/// Streams synthetic motion-capture frames over TCP or UDP.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen for TCP clients on host:port
    #[arg(long, conflicts_with = "udp", required_unless_present = "udp")]
    tcp: Option<String>,

    /// Send UDP datagrams to host:port
    #[arg(long)]
    udp: Option<String>,

    /// Frames per second per avatar
    #[arg(long, default_value = "60")]
    rate: u32,

    /// Number of avatars in the stream
    #[arg(long, default_value = "1")]
    avatars: u32,

    /// Values per frame
    #[arg(long, default_value = "354")]
    values: usize,

    /// Header family to emit (calc or bvh)
    #[arg(long, default_value = "calc")]
    format: HeaderFormat,
}

fn resolve(target: &str) -> Option<SocketAddr> {
    target.to_socket_addrs().ok()?.next()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (flag, raw) = match (&args.tcp, &args.udp) {
        (Some(addr), _) => ("--tcp", addr),
        (None, Some(addr)) => ("--udp", addr),
        (None, None) => unreachable!("clap requires --tcp or --udp"),
    };
    let Some(addr) = resolve(raw) else {
        error!("{flag}: cannot resolve '{raw}'");
        process::exit(2);
    };
    let target = if args.tcp.is_some() {
        ServerTarget::Tcp(addr)
    } else {
        ServerTarget::Udp(addr)
    };

    info!(
        "Streaming {} avatar(s), {} values per frame, {} headers at {} Hz",
        args.avatars, args.values, args.format, args.rate
    );
    let generator = MotionGenerator::new(args.format, args.avatars, args.values);
    let server = SimServer::new(target, generator, args.rate);

    if let Err(e) = server.run().await {
        error!("Server stopped: {e}");
        process::exit(1);
    }
}
