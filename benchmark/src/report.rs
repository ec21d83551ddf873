use std::fmt::Write;

use itertools::Itertools;
use sealed_io::BenchmarkResult;

const MIB: usize = 1024 * 1024;

pub fn header() -> String {
    format!(
        "{:<12} | {:<12} | {:<11} | {:<12}",
        "Size (MB)", "Write (MB/s)", "Read (MB/s)", "Latency (ms)"
    )
}

pub fn line(r: &BenchmarkResult) -> String {
    let latency = match r.latency {
        Some(d) => format!("{:.2}", d.as_secs_f64() * 1000.0),
        None => "-".to_owned(),
    };
    let mut line = format!(
        "{:<12.2} | {:<12.2} | {:<11.2} | {:<12}",
        r.size as f64 / MIB as f64,
        r.write_throughput_mibps,
        r.read_throughput_mibps,
        latency,
    );
    if r.write_errors + r.read_errors > 0 {
        let _ = write!(
            line,
            " ({} write / {} read errors)",
            r.write_errors, r.read_errors
        );
    }
    line
}

pub fn table(results: &[BenchmarkResult]) -> String {
    std::iter::once(header())
        .chain(std::iter::once("-".repeat(header().len())))
        .chain(results.iter().map(line))
        .join("\n")
}
