//! Periodic host statistics published as display strings.

use crate::signal::{self, Signal, SignalRegistry};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use nix::sys::statvfs::statvfs;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Aggregate CPU jiffies from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub total: u64,
    pub idle: u64,
}

pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() < 4 {
        return None;
    }
    // user nice system idle iowait irq softirq steal; guest time is already in user
    let total = fields.iter().take(8).sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes { total, idle })
}

/// Busy percentage between two samples.
pub fn cpu_usage(previous: CpuTimes, current: CpuTimes) -> f32 {
    let total = current.total.saturating_sub(previous.total);
    if total == 0 {
        return 0.0;
    }
    let idle = current.idle.saturating_sub(previous.idle).min(total);
    (1.0 - idle as f32 / total as f32) * 100.0
}

/// Used memory percentage, excluding buffers and page cache.
pub fn parse_memory_usage(meminfo: &str) -> Option<f32> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find_map(|l| l.strip_prefix(name))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|v| v.parse().ok())
    };
    let total = field("MemTotal:")?;
    if total == 0 {
        return None;
    }
    let free = field("MemFree:").unwrap_or(0);
    let buffers = field("Buffers:").unwrap_or(0);
    let cached = field("Cached:").unwrap_or(0);
    let used = total.saturating_sub(free + buffers + cached);
    Some(used as f32 / total as f32 * 100.0)
}

/// Degrees Celsius from a millidegree thermal zone reading.
pub fn parse_temperature(raw: &str) -> Option<f32> {
    raw.trim().parse::<i64>().ok().map(|m| m as f32 / 1000.0)
}

/// 1, 5 and 15 minute load averages.
pub fn parse_load_average(raw: &str) -> Option<[f32; 3]> {
    let mut fields = raw.split_whitespace().map(|f| f.parse::<f32>());
    Some([
        fields.next()?.ok()?,
        fields.next()?.ok()?,
        fields.next()?.ok()?,
    ])
}

pub fn parse_uptime(raw: &str) -> Option<Duration> {
    let seconds: f64 = raw.split_whitespace().next()?.parse().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

/// Used space percentage from filesystem block counts, as `df` reports it.
pub fn disk_usage_percent(blocks: u64, available: u64) -> Option<f32> {
    if blocks == 0 {
        return None;
    }
    let used = blocks.saturating_sub(available);
    Some(used as f32 / blocks as f32 * 100.0)
}

fn read_disk_usage(path: &Path) -> nix::Result<Option<f32>> {
    let stats = statvfs(path)?;
    Ok(disk_usage_percent(
        u64::from(stats.blocks()),
        u64::from(stats.blocks_available()),
    ))
}

/// Received and transmitted byte totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Totals over every interface except loopback, from `/proc/net/dev`.
pub fn parse_net_dev(raw: &str) -> Option<NetCounters> {
    let mut totals = NetCounters::default();
    let mut interfaces = 0;
    for line in raw.lines() {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<u64> = counters
            .split_whitespace()
            .map_while(|f| f.parse().ok())
            .collect();
        // rx bytes is the first counter, tx bytes the ninth
        if fields.len() < 9 {
            continue;
        }
        interfaces += 1;
        if name.trim() == "lo" {
            continue;
        }
        totals.rx_bytes = totals.rx_bytes.saturating_add(fields[0]);
        totals.tx_bytes = totals.tx_bytes.saturating_add(fields[8]);
    }
    (interfaces > 0).then_some(totals)
}

/// Receive and transmit rates in bytes per second. Counter resets read as zero.
pub fn network_rates(
    previous: NetCounters,
    current: NetCounters,
    elapsed: Duration,
) -> Option<(f64, f64)> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    Some((
        current.rx_bytes.saturating_sub(previous.rx_bytes) as f64 / secs,
        current.tx_bytes.saturating_sub(previous.tx_bytes) as f64 / secs,
    ))
}

pub fn format_rate(bytes_per_second: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    let mut value = bytes_per_second.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    format!(
        "{}d {:02}:{:02}:{:02}",
        days,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

struct Outputs {
    cpu_usage: Option<Signal<String>>,
    memory_usage: Option<Signal<String>>,
    cpu_temp: Option<Signal<String>>,
    load_avg: Option<Signal<String>>,
    uptime: Option<Signal<String>>,
    disk_usage: Option<Signal<String>>,
    network_usage: Option<Signal<String>>,
}

impl Outputs {
    fn resolve(registry: &SignalRegistry) -> Self {
        let get = |name: &str| match registry.get::<String>(name) {
            Ok(signal) => Some(signal),
            Err(e) => {
                warn!("{}, not reporting it", e);
                None
            }
        };
        Self {
            cpu_usage: get(signal::CPU_USAGE),
            memory_usage: get(signal::MEMORY_USAGE),
            cpu_temp: get(signal::CPU_TEMP),
            load_avg: get(signal::LOAD_AVG),
            uptime: get(signal::UPTIME),
            disk_usage: get(signal::DISK_USAGE),
            network_usage: get(signal::NETWORK_USAGE),
        }
    }
}

struct Sampler {
    root: PathBuf,
    disk_path: PathBuf,
    outputs: Outputs,
    previous_cpu: Option<CpuTimes>,
    previous_net: Option<(NetCounters, Instant)>,
}

impl Sampler {
    fn read(&self, relative: &str) -> Option<String> {
        let path = self.root.join(relative);
        match fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn publish(signal: &Option<Signal<String>>, value: Option<String>) {
        if let (Some(signal), Some(value)) = (signal, value) {
            signal.set(value);
        }
    }

    fn sample(&mut self) {
        let cpu = self.read("proc/stat").and_then(|s| parse_cpu_times(&s));
        let usage = match (self.previous_cpu, cpu) {
            (Some(previous), Some(current)) => Some(cpu_usage(previous, current)),
            _ => None,
        };
        if cpu.is_some() {
            self.previous_cpu = cpu;
        }
        Self::publish(&self.outputs.cpu_usage, usage.map(|u| format!("{:.2} %", u)));

        let memory = self
            .read("proc/meminfo")
            .and_then(|s| parse_memory_usage(&s));
        Self::publish(&self.outputs.memory_usage, memory.map(|m| format!("{:.2} %", m)));

        let temp = self
            .read("sys/class/thermal/thermal_zone0/temp")
            .and_then(|s| parse_temperature(&s));
        Self::publish(&self.outputs.cpu_temp, temp.map(|t| format!("{:.2} °C", t)));

        let load = self
            .read("proc/loadavg")
            .and_then(|s| parse_load_average(&s));
        Self::publish(
            &self.outputs.load_avg,
            load.map(|[one, five, fifteen]| format!("{:.2} {:.2} {:.2}", one, five, fifteen)),
        );

        let uptime = self.read("proc/uptime").and_then(|s| parse_uptime(&s));
        Self::publish(&self.outputs.uptime, uptime.map(format_uptime));

        let disk = match read_disk_usage(&self.disk_path) {
            Ok(usage) => usage,
            Err(e) => {
                error!("Failed to stat {}: {}", self.disk_path.display(), e);
                None
            }
        };
        Self::publish(&self.outputs.disk_usage, disk.map(|d| format!("{:.2} %", d)));

        let net = self.read("proc/net/dev").and_then(|s| parse_net_dev(&s));
        let now = Instant::now();
        let rates = match (self.previous_net, net) {
            (Some((previous, at)), Some(current)) => network_rates(previous, current, now - at),
            _ => None,
        };
        if let Some(current) = net {
            self.previous_net = Some((current, now));
        }
        Self::publish(
            &self.outputs.network_usage,
            rates.map(|(rx, tx)| format!("rx {} tx {}", format_rate(rx), format_rate(tx))),
        );

        debug!(
            "System stats: cpu {:?}, mem {:?}, temp {:?}, disk {:?}, net {:?}",
            usage, memory, temp, disk, rates
        );
    }
}

/// Background thread sampling host statistics every `interval`.
pub struct SystemMonitor {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SystemMonitor {
    /// Disk usage is reported for the filesystem holding `disk_path`.
    pub fn start(
        registry: &SignalRegistry,
        interval: Duration,
        disk_path: &Path,
    ) -> std::io::Result<Self> {
        Self::start_at(registry, interval, Path::new("/"), disk_path)
    }

    /// Like [`SystemMonitor::start`] with `/proc` and `/sys` looked up under `root`.
    pub fn start_at(
        registry: &SignalRegistry,
        interval: Duration,
        root: &Path,
        disk_path: &Path,
    ) -> std::io::Result<Self> {
        let mut sampler = Sampler {
            root: root.to_path_buf(),
            disk_path: disk_path.to_path_buf(),
            outputs: Outputs::resolve(registry),
            previous_cpu: None,
            previous_net: None,
        };
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let thread = thread::Builder::new()
            .name("system-monitor".into())
            .spawn(move || loop {
                sampler.sample();
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
            })?;

        info!("System monitor started ({:?} interval)", interval);
        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("System monitor thread panicked");
            }
            info!("System monitor stopped");
        }
    }
}

impl Drop for SystemMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
