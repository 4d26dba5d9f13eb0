//! Shell protocol: login gate, prompt, commands, session teardown

mod common;

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sherlok::{Config, Monitor};

fn started_monitor(password: Option<&str>) -> Arc<Monitor> {
    let mut config = Config::default();
    config
        .apply_options("Port=0;MonitorOn=on;MinMemorySize=0;Tracer=tree")
        .unwrap();
    config.password = password.map(str::to_string);
    let monitor = Monitor::new(config, Arc::new(common::TestHost::default()));
    monitor.start();

    let deadline = Instant::now() + Duration::from_secs(5);
    while monitor.shell_port() == 0 {
        assert!(Instant::now() < deadline, "shell did not come up");
        std::thread::sleep(Duration::from_millis(10));
    }
    monitor
}

fn connect(monitor: &Monitor) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", monitor.shell_port())).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// Read until `needle` shows up in the accumulated session text.
fn read_until(reader: &mut impl Read, needle: &str) -> String {
    let mut seen = String::new();
    let mut buffer = [0u8; 512];
    let deadline = Instant::now() + Duration::from_secs(5);
    while !seen.contains(needle) {
        assert!(Instant::now() < deadline, "timed out waiting for {needle:?}, got:\n{seen}");
        match reader.read(&mut buffer) {
            Ok(0) => panic!("connection closed waiting for {needle:?}, got:\n{seen}"),
            Ok(n) => seen.push_str(&String::from_utf8_lossy(&buffer[..n])),
            Err(err) => panic!("read failed waiting for {needle:?}: {err}"),
        }
    }
    seen
}

#[test]
fn test_session_prompt_and_commands() {
    let monitor = started_monitor(None);
    let mut stream = connect(&monitor);

    read_until(&mut stream, "sherlok> ");
    stream.write_all(b"echo shell-works\n").unwrap();
    read_until(&mut stream, "shell-works");

    stream.write_all(b"lss\n").unwrap();
    read_until(&mut stream, "List Type=Statistic");

    stream.write_all(b"exit\n").unwrap();
    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest);

    monitor.shutdown();
}

#[test]
fn test_password_gate() {
    let monitor = started_monitor(Some("sesame"));

    // Wrong password: the session is rejected.
    let mut stream = connect(&monitor);
    read_until(&mut stream, "Password: ");
    stream.write_all(b"wrong\n").unwrap();
    let mut rest = String::new();
    let _ = stream.read_to_string(&mut rest);
    assert!(rest.contains("rejected"), "expected a rejection, got {rest:?}");

    // Right password: the prompt appears and commands work.
    let mut stream = connect(&monitor);
    read_until(&mut stream, "Password: ");
    stream.write_all(b"sesame\n").unwrap();
    read_until(&mut stream, "sherlok> ");
    stream.write_all(b"version\n").unwrap();
    read_until(&mut stream, "sherlok");
    stream.write_all(b"exit\n").unwrap();

    monitor.shutdown();
}

#[test]
fn test_client_drop_resumes_listening() {
    let monitor = started_monitor(None);

    {
        let mut stream = connect(&monitor);
        read_until(&mut stream, "sherlok> ");
        // Drop without exit: the server must recover.
    }

    let mut stream = connect(&monitor);
    read_until(&mut stream, "sherlok> ");
    stream.write_all(b"info\n").unwrap();
    read_until(&mut stream, "monitoring active");
    stream.write_all(b"exit\n").unwrap();

    monitor.shutdown();
}

#[test]
fn test_xml_session_frames_with_root_tag() {
    let mut config = Config::default();
    config.apply_options("Port=0;Tracer=xml").unwrap();
    let monitor = Monitor::new(config, Arc::new(common::TestHost::default()));
    monitor.start();
    let deadline = Instant::now() + Duration::from_secs(5);
    while monitor.shell_port() == 0 {
        assert!(Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(10));
    }

    let stream = connect(&monitor);
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;

    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line.trim_end(), "<sherlok>");

    writer.write_all(b"version\n").unwrap();
    let mut collected = String::new();
    loop {
        let mut next = String::new();
        reader.read_line(&mut next).unwrap();
        collected.push_str(&next);
        if collected.contains("Trace") {
            break;
        }
    }
    assert!(collected.contains("Type=\"Message\""), "xml payload expected, got:\n{collected}");

    writer.write_all(b"exit\n").unwrap();
    let closing = read_until(&mut reader, "</sherlok>");
    assert!(closing.contains("</sherlok>"));

    monitor.shutdown();
}
