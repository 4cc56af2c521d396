//! Wraps a child process: both output streams are echoed live and every
//! complete line is handed to the analyzer on the calling thread.

use std::io::{BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, SyncSender};
use std::thread::JoinHandle;

use anyhow::Context;

use crate::analyzer::Analyzer;
use crate::input::for_each_line;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Sink { Stdout, Stderr, Discard }

/// Runs `argv`, echoing its output, and returns the child's exit code. The caller finalizes the analyzer.
pub fn run_command(argv: &[String], analyzer: &mut Analyzer) -> anyhow::Result<i32> {
    run_command_with(argv, analyzer, true)
}

pub fn run_command_with(argv: &[String], analyzer: &mut Analyzer, echo: bool) -> anyhow::Result<i32> {
    let (program, rest) = argv.split_first().context("no command given")?;
    log::info!("running {} {}", program, rest.join(" "));
    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to launch {}", program))?;
    let stdout = child.stdout.take().context("child stdout was not captured")?;
    let stderr = child.stderr.take().context("child stderr was not captured")?;

    let (tx, rx) = mpsc::sync_channel::<String>(CHANNEL_CAPACITY);
    let readers = [
        spawn_forwarder(stdout, if echo { Sink::Stdout } else { Sink::Discard }, tx.clone()),
        spawn_forwarder(stderr, if echo { Sink::Stderr } else { Sink::Discard }, tx),
    ];
    // Ends once both readers hit EOF and drop their senders.
    for line in rx { analyzer.process_line(&line); }
    for (name, handle) in ["stdout", "stderr"].into_iter().zip(readers) {
        match handle.join() {
            Ok(Ok(n)) => log::debug!("{}: {} lines", name, n),
            Ok(Err(e)) => log::warn!("reading child {} failed: {}", name, e),
            Err(_) => log::error!("{} reader thread panicked", name),
        }
    }
    let status = child.wait().with_context(|| format!("failed to wait for {}", program))?;
    let code = exit_code(status);
    log::info!("{} exited with code {}", program, code);
    Ok(code)
}

fn spawn_forwarder<R: Read + Send + 'static>(src: R, sink: Sink, tx: SyncSender<String>) -> JoinHandle<std::io::Result<u64>> {
    std::thread::spawn(move || {
        for_each_line(BufReader::new(src), |line| {
            match sink {
                Sink::Stdout => echo_line(std::io::stdout().lock(), line),
                Sink::Stderr => echo_line(std::io::stderr().lock(), line),
                Sink::Discard => {}
            }
            // The consumer only goes away on a panic; keep draining so the child never blocks on a full pipe.
            let _ = tx.send(line.to_string());
        })
    })
}

fn echo_line<W: Write>(mut w: W, line: &str) {
    let _ = w.write_all(line.as_bytes());
    let _ = w.flush();
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(c) = status.code() { return c; }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() { return 128 + sig; }
    }
    1
}
