//! Scanner tests against real loopback sockets

use sockexpect::{ExpectError, Scanner, ScannerWarning, Script, TcpConfig};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Accept one connection and hand it to `serve`.
fn serve_once<F>(serve: F) -> (TcpConfig, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve(stream);
    });
    (TcpConfig::new("127.0.0.1", port), handle)
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line
}

#[test]
fn temp_reading_split_across_writes() {
    let (config, server) = serve_once(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut stream = stream;
        assert_eq!(read_line(&mut reader), "ADC\r\n");
        stream.write_all(b"ADC\r\nVbat=3.31\r\nTem").unwrap();
        thread::sleep(Duration::from_millis(50));
        stream.write_all(b"p_C=21.5\r\n> ").unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let stream = config
        .read_timeout(Some(Duration::from_secs(2)))
        .connect()
        .unwrap();
    let mut scanner = Scanner::new(stream).unwrap();
    assert!(scanner.warnings().is_empty());

    scanner.send_line(b"ADC").unwrap();
    scanner.expect(r"Temp_C.*\n").unwrap();

    assert_eq!(scanner.before(), b"ADC\r\nVbat=3.31\r\n");
    assert_eq!(scanner.matched(), b"Temp_C=21.5\r\n");

    // The prompt may or may not have arrived with the reading.
    scanner.expect(">").unwrap();
    assert_eq!(scanner.before(), b"Temp_C=21.5\r\n");

    server.join().unwrap();
}

#[test]
fn silent_peer_times_out_with_data_kept() {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (config, server) = serve_once(move |mut stream| {
        stream.write_all(b"booting...").unwrap();
        let _ = done_rx.recv_timeout(Duration::from_secs(5));
    });

    let stream = config
        .read_timeout(Some(Duration::from_millis(150)))
        .connect()
        .unwrap();
    let mut scanner = Scanner::new(stream).unwrap();

    let err = scanner.expect("READY").unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");
    assert_eq!(err.received(), Some(&b"booting..."[..]));
    assert_eq!(scanner.after(), b"booting...");
    assert!(scanner.before().is_empty());

    done_tx.send(()).unwrap();
    server.join().unwrap();
}

#[test]
fn peer_close_ends_stream() {
    let (config, server) = serve_once(|mut stream| {
        stream.write_all(b"bye\r\n").unwrap();
    });

    let stream = config
        .read_timeout(Some(Duration::from_secs(2)))
        .connect()
        .unwrap();
    let mut scanner = Scanner::new(stream).unwrap();
    server.join().unwrap();

    match scanner.expect("never") {
        Err(ExpectError::StreamEnded { received, .. }) => assert_eq!(received, b"bye\r\n"),
        other => panic!("expected StreamEnded, got {other:?}"),
    }
}

#[test]
fn missing_timeout_gets_default() {
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let (config, server) = serve_once(move |_stream| {
        let _ = done_rx.recv_timeout(Duration::from_secs(5));
    });

    let stream = TcpStream::connect((config.host.as_str(), config.port)).unwrap();
    assert_eq!(stream.read_timeout().unwrap(), None);

    let scanner = Scanner::new(stream).unwrap();
    assert_eq!(
        scanner.warnings(),
        &[ScannerWarning::TimeoutDefaulted(Duration::from_secs(1))]
    );
    assert_eq!(scanner.get_ref().read_timeout().unwrap(), Some(Duration::from_secs(1)));

    done_tx.send(()).unwrap();
    server.join().unwrap();
}

#[test]
fn script_over_tcp() {
    let (config, server) = serve_once(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut stream = stream;
        assert_eq!(read_line(&mut reader), "ID\r\n");
        stream.write_all(b"ID\r\nSN=00A1 FW=1.4.2\r\n> ").unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let script = Script::parse(
        r#"
name = "identify"

[[steps]]
action = "send_line"
data = "ID"

[[steps]]
action = "expect"
pattern = 'SN=\w+ '

[[steps]]
action = "expect"
pattern = "> "

[[steps]]
action = "check"
buffer = "before"
pattern = 'FW=\d+\.\d+'
"#,
    )
    .unwrap();

    let stream = config
        .read_timeout(Some(Duration::from_secs(2)))
        .connect()
        .unwrap();
    let mut scanner = Scanner::new(stream).unwrap();
    let report = script.run(&mut scanner).unwrap();

    assert_eq!(report.steps_run, 4);
    assert_eq!(report.checks_passed, 1);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].before, b"ID\r\n");
    assert_eq!(report.records[1].before, b"SN=00A1 FW=1.4.2\r\n");

    server.join().unwrap();
}
