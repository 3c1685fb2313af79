//! Monitor output ingestion
//!
//! A resource monitor running on every machine appends procfs snapshots to
//! one file per source and host:
//!
//! ```text
//! <dir>/proc-stat-<host>        /proc/stat
//! <dir>/proc-net-dev-<host>     /proc/net/dev
//! <dir>/proc-diskstats-<host>   /proc/diskstats
//! ```
//!
//! Each file is a sequence of snapshots. A snapshot starts with a
//! `timestamp <nanoseconds>` line followed by the raw procfs text. Counters
//! are cumulative, so utilization is derived per interval between two
//! consecutive snapshots. A file with fewer than two snapshots yields empty
//! series.
//!
//! Other `proc-*` files (e.g. `proc-meminfo-<host>`) are ignored.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;
const NANOS_PER_MILLI: f64 = 1_000_000.0;
const SECTOR_BYTES: f64 = 512.0;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("CPU, network, and disk data must be available for all monitored hosts")]
    InconsistentHosts {
        cpu: Vec<String>,
        network: Vec<String>,
        disk: Vec<String>,
    },

    #[error("{file}:{line}: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// One value per interval between consecutive snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UtilizationSeries {
    /// Interval start, nanoseconds
    pub start: Vec<u64>,
    /// Interval end, nanoseconds
    pub end: Vec<u64>,
    pub values: Vec<f64>,
}

impl UtilizationSeries {
    fn push(&mut self, start: u64, end: u64, value: f64) {
        self.start.push(start);
        self.end.push(end);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        }
    }

    pub fn peak(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// CPU utilization in busy cores (`0..=num_cores`)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuUtilizationData {
    pub num_cores: usize,
    pub total: UtilizationSeries,
    pub cores: BTreeMap<String, UtilizationSeries>,
}

/// Per-interface throughput in bytes per second
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterfaceUtilization {
    pub received: UtilizationSeries,
    pub transmitted: UtilizationSeries,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkUtilizationData {
    pub interfaces: BTreeMap<String, InterfaceUtilization>,
}

/// Per-device throughput in bytes per second and fraction of time busy
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskUtilization {
    pub read: UtilizationSeries,
    pub written: UtilizationSeries,
    pub busy: UtilizationSeries,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisksUtilizationData {
    pub disks: BTreeMap<String, DiskUtilization>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineUtilizationData {
    pub hostname: String,
    pub cpu: CpuUtilizationData,
    pub network: NetworkUtilizationData,
    pub disks: DisksUtilizationData,
}

/// Parsed monitor output, one entry per host in hostname order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorOutput {
    pub machines: Vec<MachineUtilizationData>,
}

impl MonitorOutput {
    pub fn machine(&self, hostname: &str) -> Option<&MachineUtilizationData> {
        self.machines.iter().find(|m| m.hostname == hostname)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Stat,
    NetDev,
    Diskstats,
}

fn file_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^proc-(stat|net-dev|diskstats)-(.+)$").ok())
        .as_ref()
}

/// Classify a monitor file name into its procfs source and host
fn classify(file_name: &str) -> Option<(Source, &str)> {
    let caps = file_pattern()?.captures(file_name)?;
    let source = match caps.get(1)?.as_str() {
        "stat" => Source::Stat,
        "net-dev" => Source::NetDev,
        _ => Source::Diskstats,
    };
    Some((source, caps.get(2)?.as_str()))
}

pub struct MonitorOutputParser;

impl MonitorOutputParser {
    /// Parse every monitor file below `dir`
    ///
    /// Fails unless CPU, network and disk data exist for exactly the same
    /// set of hosts.
    pub fn parse_directory(dir: impl AsRef<Path>) -> Result<MonitorOutput> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        collect_files(dir, &mut files)?;
        files.sort();

        let mut cpu = BTreeMap::new();
        let mut network = BTreeMap::new();
        let mut disks = BTreeMap::new();

        for path in &files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((source, host)) = classify(name) else {
                if name.starts_with("proc-") {
                    debug!(file = name, "skipping unsupported monitor file");
                }
                continue;
            };
            let text = std::fs::read_to_string(path).map_err(|source| MonitorError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let host = host.to_string();
            match source {
                Source::Stat => {
                    cpu.insert(host, parse_proc_stat(name, &text)?);
                }
                Source::NetDev => {
                    network.insert(host, parse_proc_net_dev(name, &text)?);
                }
                Source::Diskstats => {
                    disks.insert(host, parse_proc_diskstats(name, &text)?);
                }
            }
        }

        if !cpu.keys().eq(network.keys()) || !cpu.keys().eq(disks.keys()) {
            let err = MonitorError::InconsistentHosts {
                cpu: cpu.keys().cloned().collect(),
                network: network.keys().cloned().collect(),
                disk: disks.keys().cloned().collect(),
            };
            warn!(error = ?err, "inconsistent monitor output");
            return Err(err);
        }

        let machines: Vec<_> = cpu
            .into_iter()
            .filter_map(|(hostname, cpu)| {
                let network = network.remove(&hostname)?;
                let disks = disks.remove(&hostname)?;
                Some(MachineUtilizationData {
                    hostname,
                    cpu,
                    network,
                    disks,
                })
            })
            .collect();

        info!(hosts = machines.len(), dir = %dir.display(), "parsed monitor output");
        Ok(MonitorOutput { machines })
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let io_err = |source| MonitorError::Io {
        path: dir.display().to_string(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

struct Snapshot<'a> {
    timestamp: u64,
    /// 1-based line number of the first body line
    first_line: usize,
    lines: Vec<&'a str>,
}

fn parse_error(file: &str, line: usize, reason: impl Into<String>) -> MonitorError {
    MonitorError::Parse {
        file: file.to_string(),
        line,
        reason: reason.into(),
    }
}

fn split_snapshots<'a>(file: &str, text: &'a str) -> Result<Vec<Snapshot<'a>>> {
    let mut snapshots: Vec<Snapshot<'a>> = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        if let Some(rest) = line.strip_prefix("timestamp ") {
            let timestamp: u64 = rest
                .trim()
                .parse()
                .map_err(|_| parse_error(file, line_no, format!("invalid timestamp {:?}", rest)))?;
            if let Some(prev) = snapshots.last() {
                if timestamp <= prev.timestamp {
                    return Err(parse_error(file, line_no, "timestamps must increase"));
                }
            }
            snapshots.push(Snapshot {
                timestamp,
                first_line: line_no + 1,
                lines: Vec::new(),
            });
        } else if let Some(current) = snapshots.last_mut() {
            current.lines.push(line);
        } else if !line.trim().is_empty() {
            return Err(parse_error(file, line_no, "data before first timestamp"));
        }
    }

    Ok(snapshots)
}

fn parse_counters(file: &str, line: usize, fields: &[&str]) -> Result<Vec<u64>> {
    fields
        .iter()
        .map(|f| {
            f.parse::<u64>()
                .map_err(|_| parse_error(file, line, format!("invalid counter {:?}", f)))
        })
        .collect()
}

/// (busy, total) jiffies of one `cpu` line
fn cpu_jiffies(file: &str, line: usize, fields: &[&str]) -> Result<(u64, u64)> {
    let counters = parse_counters(file, line, fields)?;
    if counters.len() < 4 {
        return Err(parse_error(file, line, "cpu line needs at least 4 counters"));
    }
    // user nice system idle iowait irq softirq steal; guest time is already in user
    let total: u64 = counters.iter().take(8).sum();
    let idle = counters[3] + counters.get(4).copied().unwrap_or(0);
    Ok((total.saturating_sub(idle), total))
}

fn parse_proc_stat(file: &str, text: &str) -> Result<CpuUtilizationData> {
    let mut samples: Vec<(u64, BTreeMap<String, (u64, u64)>)> = Vec::new();

    for snapshot in split_snapshots(file, text)? {
        let mut cpus = BTreeMap::new();
        for (offset, line) in snapshot.lines.iter().enumerate() {
            let mut fields = line.split_whitespace();
            let Some(label) = fields.next().filter(|l| l.starts_with("cpu")) else {
                continue;
            };
            let rest: Vec<&str> = fields.collect();
            cpus.insert(
                label.to_string(),
                cpu_jiffies(file, snapshot.first_line + offset, &rest)?,
            );
        }
        samples.push((snapshot.timestamp, cpus));
    }

    let mut data = CpuUtilizationData::default();
    for pair in samples.windows(2) {
        let (start, before) = &pair[0];
        let (end, after) = &pair[1];
        let cores: Vec<&String> = after.keys().filter(|k| k.as_str() != "cpu").collect();
        data.num_cores = data.num_cores.max(cores.len());

        let busy_fraction = |label: &str| -> f64 {
            match (before.get(label), after.get(label)) {
                (Some(&(b0, t0)), Some(&(b1, t1))) if t1 > t0 => {
                    (b1.saturating_sub(b0) as f64 / (t1 - t0) as f64).clamp(0.0, 1.0)
                }
                _ => 0.0,
            }
        };

        for core in &cores {
            data.cores
                .entry((*core).clone())
                .or_default()
                .push(*start, *end, busy_fraction(core.as_str()));
        }
        let total = if after.contains_key("cpu") {
            busy_fraction("cpu") * cores.len().max(1) as f64
        } else {
            cores.iter().map(|c| busy_fraction(c.as_str())).sum()
        };
        data.total.push(*start, *end, total);
    }

    debug!(file, intervals = data.total.len(), cores = data.num_cores, "parsed proc stat");
    Ok(data)
}

fn parse_proc_net_dev(file: &str, text: &str) -> Result<NetworkUtilizationData> {
    let mut samples: Vec<(u64, BTreeMap<String, (u64, u64)>)> = Vec::new();

    for snapshot in split_snapshots(file, text)? {
        let mut interfaces = BTreeMap::new();
        for (offset, line) in snapshot.lines.iter().enumerate() {
            // Header lines contain '|'
            let Some((name, counters)) = line.split_once(':') else {
                continue;
            };
            if name.contains('|') {
                continue;
            }
            let fields: Vec<&str> = counters.split_whitespace().collect();
            let line_no = snapshot.first_line + offset;
            if fields.len() < 9 {
                return Err(parse_error(file, line_no, "interface line needs 16 counters"));
            }
            let counters = parse_counters(file, line_no, &fields)?;
            interfaces.insert(name.trim().to_string(), (counters[0], counters[8]));
        }
        samples.push((snapshot.timestamp, interfaces));
    }

    let mut data = NetworkUtilizationData::default();
    for pair in samples.windows(2) {
        let (start, before) = &pair[0];
        let (end, after) = &pair[1];
        let seconds = (end - start) as f64 / NANOS_PER_SEC;
        for (name, &(rx1, tx1)) in after {
            let (rx0, tx0) = before.get(name).copied().unwrap_or((rx1, tx1));
            let entry = data.interfaces.entry(name.clone()).or_default();
            entry
                .received
                .push(*start, *end, rx1.saturating_sub(rx0) as f64 / seconds);
            entry
                .transmitted
                .push(*start, *end, tx1.saturating_sub(tx0) as f64 / seconds);
        }
    }

    debug!(file, interfaces = data.interfaces.len(), "parsed proc net dev");
    Ok(data)
}

#[derive(Debug, Clone, Copy)]
struct DiskCounters {
    sectors_read: u64,
    sectors_written: u64,
    io_millis: u64,
}

fn parse_proc_diskstats(file: &str, text: &str) -> Result<DisksUtilizationData> {
    let mut samples: Vec<(u64, BTreeMap<String, DiskCounters>)> = Vec::new();

    for snapshot in split_snapshots(file, text)? {
        let mut devices = BTreeMap::new();
        for (offset, line) in snapshot.lines.iter().enumerate() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            let line_no = snapshot.first_line + offset;
            // major minor name, then at least 11 counters
            if fields.len() < 14 {
                return Err(parse_error(file, line_no, "diskstats line needs 14 fields"));
            }
            let counters = parse_counters(file, line_no, &fields[3..])?;
            devices.insert(
                fields[2].to_string(),
                DiskCounters {
                    sectors_read: counters[2],
                    sectors_written: counters[6],
                    io_millis: counters[9],
                },
            );
        }
        samples.push((snapshot.timestamp, devices));
    }

    let mut data = DisksUtilizationData::default();
    for pair in samples.windows(2) {
        let (start, before) = &pair[0];
        let (end, after) = &pair[1];
        let nanos = (end - start) as f64;
        let seconds = nanos / NANOS_PER_SEC;
        for (name, now) in after {
            let prev = before.get(name).copied().unwrap_or(*now);
            let entry = data.disks.entry(name.clone()).or_default();
            entry.read.push(
                *start,
                *end,
                now.sectors_read.saturating_sub(prev.sectors_read) as f64 * SECTOR_BYTES / seconds,
            );
            entry.written.push(
                *start,
                *end,
                now.sectors_written.saturating_sub(prev.sectors_written) as f64 * SECTOR_BYTES
                    / seconds,
            );
            let busy = now.io_millis.saturating_sub(prev.io_millis) as f64 * NANOS_PER_MILLI / nanos;
            entry.busy.push(*start, *end, busy.clamp(0.0, 1.0));
        }
    }

    debug!(file, disks = data.disks.len(), "parsed proc diskstats");
    Ok(data)
}
