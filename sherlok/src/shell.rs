//! The shell thread: one TCP client at a time, line-oriented commands
//!
//! The listener accepts a single client, optionally gates it with the
//! configured password, fixes the session's output format, and then reads
//! one command line at a time into the interpreter. Responses and trace
//! events travel through the output hub, which owns a clone of the client
//! stream; a failed write there tears the connection down and the listener
//! resumes accepting.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::command::{self, CommandResult};
use crate::domain::ShellError;
use crate::monitor::Monitor;
use crate::output::OutputFormat;

const PROMPT: &str = "sherlok> ";

pub fn run(monitor: &Arc<Monitor>) {
    let port = monitor.config.read().unwrap().port;
    let listener = match TcpListener::bind(("127.0.0.1", port)) {
        Ok(listener) => listener,
        Err(err) => {
            warn!("shell cannot bind port {port}: {err}");
            return;
        }
    };
    if let Ok(addr) = listener.local_addr() {
        monitor.publish_shell_port(addr.port());
        info!("shell listening on {addr}");
    }

    for stream in listener.incoming() {
        if monitor.is_shutdown() {
            break;
        }
        match stream {
            Ok(stream) => {
                let peer = stream.peer_addr().map_or_else(|_| "?".to_string(), |a| a.to_string());
                debug!("shell client connected: {peer}");
                match handle_client(monitor, stream) {
                    Ok(()) | Err(ShellError::Disconnected) => {
                        debug!("shell client gone: {peer}");
                    }
                    Err(err) => warn!("shell session ended: {err}"),
                }
                monitor.hub.detach_shell();
            }
            Err(err) => {
                if monitor.is_shutdown() {
                    break;
                }
                warn!("shell accept failed: {err}");
            }
        }
    }
    debug!("shell thread stopped");
}

/// Unblock the accept loop during shutdown.
pub fn wake_listener(monitor: &Monitor) {
    let port = monitor.shell_port();
    if port != 0 {
        let _ = TcpStream::connect(("127.0.0.1", port));
    }
}

fn handle_client(monitor: &Arc<Monitor>, stream: TcpStream) -> Result<(), ShellError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream.try_clone()?;

    login(monitor, &mut reader, &mut writer)?;

    // The session format is fixed before the first event.
    let format = monitor.hub.format();
    if format == OutputFormat::Xml {
        writer.write_all(b"<sherlok>\n")?;
    }
    monitor.hub.attach_shell(stream);

    loop {
        if format != OutputFormat::Xml {
            writer.write_all(PROMPT.as_bytes())?;
            writer.flush()?;
        }

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(ShellError::Disconnected);
        }

        let result = command::execute(monitor, &line);
        if monitor.hub.shell_failed() {
            return Err(ShellError::Disconnected);
        }
        if result == CommandResult::Exit {
            monitor.hub.detach_shell();
            if format == OutputFormat::Xml {
                writer.write_all(b"</sherlok>\n")?;
            }
            return Ok(());
        }
    }
}

fn login(
    monitor: &Arc<Monitor>,
    reader: &mut BufReader<TcpStream>,
    writer: &mut TcpStream,
) -> Result<(), ShellError> {
    let expected = monitor.config.read().unwrap().password.clone();
    let Some(expected) = expected else {
        return Ok(());
    };
    writer.write_all(b"Password: ")?;
    writer.flush()?;
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(ShellError::Disconnected);
    }
    if line.trim_end() == expected {
        Ok(())
    } else {
        writer.write_all(b"login rejected\n")?;
        Err(ShellError::LoginRejected)
    }
}
