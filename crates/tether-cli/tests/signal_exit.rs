//! A termination signal aborts the live context, then the process dies by
//! that same signal.

#![cfg(unix)]

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use rstest::rstest;

fn long_running_server_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    writeln!(
        file,
        "[server]\nmax_iterations = 600\npoll_interval_ms = 50\n"
    )
    .expect("write config");
    file
}

#[rstest]
#[case::terminate(libc::SIGTERM)]
#[case::interrupt(libc::SIGINT)]
fn server_dies_by_the_signal_after_cleanup(#[case] signo: i32) {
    let config = long_running_server_config();
    let mut child = Command::new(env!("CARGO_BIN_EXE_tether"))
        .arg("server")
        .arg("--config")
        .arg(config.path())
        .env("RUST_LOG", "info")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn tether");

    let stderr = child.stderr.take().expect("piped stderr");
    let (tx, rx) = mpsc::channel();
    let reader = std::thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap_or(0) > 0 {
            let ready = line.contains("running");
            line.clear();
            if ready {
                let _ = tx.send(());
                break;
            }
        }
        let mut rest = String::new();
        let _ = reader.read_to_string(&mut rest);
        rest
    });

    if rx.recv_timeout(Duration::from_secs(30)).is_err() {
        let _ = child.kill();
        panic!("server never started running");
    }

    // SAFETY: plain kill(2) on a child we spawned and have not reaped.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, signo) };
    assert_eq!(rc, 0);

    let status = child.wait().expect("wait for tether");
    let rest = reader.join().expect("stderr reader");

    assert_eq!(status.signal(), Some(signo));
    assert!(
        rest.contains(&format!("tether: caught signal {signo}, aborting 1 live context(s)")),
        "stderr after startup: {rest}"
    );
}
