use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;

use crate::analyzer::Analyzer;

/// Calls `f` once per record ending in `\n`, `\r\n` or a lone `\r`, terminator included.
/// Undecodable bytes become U+FFFD.
pub fn for_each_line<R: BufRead, F: FnMut(&str)>(mut reader: R, mut f: F) -> std::io::Result<u64> {
    let mut line: Vec<u8> = Vec::new();
    let mut count: u64 = 0;
    let mut after_cr = false;
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() { break; }
        let len = chunk.len();
        for &b in chunk {
            // A `\r` only ends the record once we know no `\n` follows it.
            if after_cr {
                after_cr = false;
                if b == b'\n' {
                    line.push(b);
                    emit(&mut line, &mut f, &mut count);
                    continue;
                }
                emit(&mut line, &mut f, &mut count);
            }
            line.push(b);
            match b {
                b'\n' => emit(&mut line, &mut f, &mut count),
                b'\r' => after_cr = true,
                _ => {}
            }
        }
        reader.consume(len);
    }
    if !line.is_empty() { emit(&mut line, &mut f, &mut count); }
    Ok(count)
}

fn emit<F: FnMut(&str)>(line: &mut Vec<u8>, f: &mut F, count: &mut u64) {
    *count += 1;
    f(&String::from_utf8_lossy(line));
    line.clear();
}

pub fn open_source(path: Option<&Path>) -> anyhow::Result<Box<dyn BufRead>> {
    match path {
        Some(p) => {
            let f = std::fs::File::open(p).with_context(|| format!("cannot open {}", p.to_string_lossy()))?;
            Ok(Box::new(BufReader::new(f)))
        }
        None => Ok(Box::new(std::io::stdin().lock())),
    }
}

/// Feeds every line of `reader` into `analyzer`. Does not finalize.
pub fn analyze_reader<R: BufRead>(reader: R, analyzer: &mut Analyzer, progress: bool) -> anyhow::Result<u64> {
    let pb = if progress { Some(indicatif::ProgressBar::new_spinner()) } else { None };
    if let Some(ref pb) = pb { pb.set_message("Reading input"); }
    let count = for_each_line(reader, |line| {
        analyzer.process_line(line);
        if let Some(ref pb) = pb {
            let n = analyzer.lines_processed();
            if n % 500 == 0 { pb.tick(); pb.set_message(format!("Scanned {} lines", n)); }
        }
    }).context("failed reading input")?;
    if let Some(pb) = pb { pb.finish_and_clear(); }
    log::info!("scanned {} lines, {} distinct events", count, analyzer.events().len());
    Ok(count)
}
