//! Debug Adapter Protocol front end of the CLI.
//!
//! Serves one debug session over stdio or a TCP socket. The protocol itself
//! lives in [`tern_engine::debugger::dap`]; this module only picks the
//! transport.

use std::io::{self, BufReader};
use std::net::{Ipv4Addr, TcpListener};
use tern_engine::debugger::dap::DapServer;

/// Transport mode for the DAP server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DapTransportMode {
    /// Standard input/output.
    Stdio,
    /// A TCP socket on `127.0.0.1` and the given port.
    Tcp(u16),
}

/// Runs one DAP session over the given transport.
pub(crate) fn run_dap_server(mode: DapTransportMode) -> io::Result<()> {
    log::info!("starting Tern debug adapter ({mode:?})");
    match mode {
        DapTransportMode::Stdio => {
            let stdin = io::stdin().lock();
            DapServer::new(io::stdout()).run(stdin)?;
        }
        DapTransportMode::Tcp(port) => run_tcp_server(port)?,
    }
    log::info!("debug adapter stopped");
    Ok(())
}

/// Accepts a single client and serves it until it disconnects.
fn run_tcp_server(port: u16) -> io::Result<()> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
    log::info!("listening on {}", listener.local_addr()?);

    let (stream, peer) = listener.accept()?;
    log::info!("client connected from {peer}");

    let reader = BufReader::new(stream.try_clone()?);
    DapServer::new(stream).run(reader)
}
