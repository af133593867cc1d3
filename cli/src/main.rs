use std::{
    process::ExitCode,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use dendrite::{
    relax::{RelaxConfig, RelaxNetwork, Topology},
    rpc::{delay_handler, RpcClient, RpcServer},
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dendrite-cli", about = "Drives the dendrite messaging layers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Shortest hop counts over a random bus network.
    Relax {
        #[arg(long, default_value_t = 500)]
        nodes: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = 0)]
        source: usize,
        /// Milliseconds between quiescence checks.
        #[arg(long, default_value_t = 100)]
        poll_ms: u64,
    },
    /// Concurrent requests of varying cost against an RPC server.
    Rpc {
        #[arg(long, default_value_t = 20)]
        requests: u32,
        #[arg(long, default_value = "inproc://dendrite-cli-rpc")]
        address: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Relax {
            nodes,
            seed,
            source,
            poll_ms,
        } => relax(nodes, seed, source, poll_ms),
        Command::Rpc { requests, address } => rpc(requests, &address),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn relax(nodes: usize, seed: u64, source: usize, poll_ms: u64) -> dendrite::Result<()> {
    let topology = Topology::random(nodes, seed);
    let expected = topology.shortest_hops(source);
    let config = RelaxConfig::builder()
        .source(source)
        .poll_interval(Duration::from_millis(poll_ms))
        .build();
    let network = RelaxNetwork::build(topology, config)?;
    network.start()?;
    let report = network.wait_quiescent();
    network.close();

    let mismatched = report
        .potentials
        .iter()
        .zip(&expected)
        .filter(|(got, want)| got != want)
        .count();
    info!(
        nodes,
        reached = report.reached(),
        received = report.received,
        elapsed = ?report.elapsed,
        mismatched,
        "relaxation finished"
    );
    Ok(())
}

fn rpc(requests: u32, address: &str) -> dendrite::Result<()> {
    let server = RpcServer::listen(address, delay_handler)?;
    let client = Arc::new(RpcClient::dial(server.address())?);
    let started = Instant::now();
    let workers: Vec<_> = (0..requests)
        .map(|i| {
            let client = client.clone();
            let delay = request_delay(i);
            thread::spawn(move || client.issue(&delay.to_be_bytes(), Duration::from_secs(30)))
        })
        .collect();
    let mut failed = 0;
    for worker in workers {
        if !matches!(worker.join(), Ok(Ok(_))) {
            failed += 1;
        }
    }
    info!(
        requests,
        failed,
        elapsed = ?started.elapsed(),
        violations = client.protocol_violations(),
        "rpc run finished"
    );
    client.close()?;
    server.close()?;
    Ok(())
}

/// Request `i` costs 1000ms less 50ms per position, never below zero.
fn request_delay(i: u32) -> u32 {
    1000u32.saturating_sub(i.saturating_mul(50))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_shrink_and_bottom_out() {
        assert_eq!(request_delay(0), 1000);
        assert_eq!(request_delay(19), 50);
        assert_eq!(request_delay(20), 0);
        assert_eq!(request_delay(u32::MAX), 0);
    }
}
