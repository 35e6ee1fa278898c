//! Node status sampling for panels that still expect pushed status

use std::path::Path;
use std::time::Instant;

/// Aggregate node metrics: percentages and uptime in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeStatus {
    pub cpu: f64,
    pub mem: f64,
    pub disk: f64,
    pub uptime: u64,
}

impl NodeStatus {
    /// `load` field of the status body: each percentage divided by 100, two decimals
    pub fn load_string(&self) -> String {
        format!(
            "{:.2} {:.2} {:.2}",
            self.cpu / 100.0,
            self.mem / 100.0,
            self.disk / 100.0
        )
    }
}

/// Samples status from procfs and the root filesystem; fields that cannot be read stay at 0
#[derive(Debug, Clone)]
pub struct StatusSampler {
    started: Instant,
    cpus: usize,
}

impl StatusSampler {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            cpus: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }

    pub fn sample(&self) -> NodeStatus {
        let cpu = std::fs::read_to_string("/proc/loadavg")
            .ok()
            .and_then(|s| parse_loadavg(&s, self.cpus))
            .unwrap_or(0.0);
        let mem = std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|s| parse_meminfo(&s))
            .unwrap_or(0.0);

        let disk = disk_usage(Path::new("/")).unwrap_or(0.0);

        NodeStatus {
            cpu,
            mem,
            disk,
            uptime: self.started.elapsed().as_secs(),
        }
    }
}

impl Default for StatusSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// One-minute load average as a percentage of available CPUs, capped at 100
fn parse_loadavg(content: &str, cpus: usize) -> Option<f64> {
    let load: f64 = content.split_whitespace().next()?.parse().ok()?;
    Some((load / cpus.max(1) as f64 * 100.0).min(100.0))
}

/// Used space percentage of the filesystem holding `path`
fn disk_usage(path: &Path) -> Option<f64> {
    let total = fs2::total_space(path).ok()?;
    let available = fs2::available_space(path).ok()?;
    used_percent(total, available)
}

fn used_percent(total: u64, available: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(available);
    Some(used as f64 / total as f64 * 100.0)
}

/// Used memory percentage from `MemTotal` and `MemAvailable`
fn parse_meminfo(content: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        content
            .lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some((total - available) / total * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_string() {
        let status = NodeStatus {
            cpu: 25.0,
            mem: 50.0,
            disk: 100.0,
            uptime: 10,
        };
        assert_eq!(status.load_string(), "0.25 0.50 1.00");
    }

    #[test]
    fn test_used_percent() {
        assert_eq!(used_percent(200, 50), Some(75.0));
        assert_eq!(used_percent(100, 100), Some(0.0));
        assert_eq!(used_percent(0, 0), None);
    }

    #[test]
    fn test_disk_usage_of_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let usage = disk_usage(dir.path()).unwrap();
        assert!((0.0..=100.0).contains(&usage));
    }

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(parse_loadavg("1.00 0.50 0.25 1/100 1234\n", 4), Some(25.0));
        assert_eq!(parse_loadavg("9.00 0.50 0.25 1/100 1234\n", 2), Some(100.0));
        assert_eq!(parse_loadavg("", 2), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "MemTotal:       1000 kB\nMemFree:         100 kB\nMemAvailable:    250 kB\n";
        assert_eq!(parse_meminfo(content), Some(75.0));
        assert_eq!(parse_meminfo("MemTotal: 1000 kB\n"), None);
    }

    #[test]
    fn test_sample_uptime_starts_near_zero() {
        let sampler = StatusSampler::new();
        assert!(sampler.sample().uptime < 5);
    }
}
