use std::time::Duration;
#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::Instant;
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Wall time and resident memory at the end of one pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSample {
    pub stage: String,
    pub elapsed: Duration,
    pub memory_mb: u64,
}

/// Slowest stage and memory peak over a run.
#[cfg_attr(not(feature = "cli"), allow(dead_code))]
fn summarize(samples: &[StageSample]) -> Option<(&StageSample, &StageSample)> {
    let slowest = samples.iter().max_by_key(|s| s.elapsed)?;
    let peak = samples.iter().max_by_key(|s| s.memory_mb)?;
    Some((slowest, peak))
}

/// 每個階段結束時記錄耗時與記憶體 (重投影通常是記憶體高峰)
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    timeline: Mutex<Timeline>,
    enabled: bool,
}

#[cfg(feature = "cli")]
struct Timeline {
    last_mark: Instant,
    samples: Vec<StageSample>,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let pid = if enabled {
            sysinfo::get_current_pid()
                .map_err(|e| tracing::warn!("⚠️ Monitor cannot resolve current PID: {}", e))
                .ok()
        } else {
            None
        };
        let now = Instant::now();

        Self {
            system: Mutex::new(System::new()),
            pid,
            started: now,
            timeline: Mutex::new(Timeline {
                last_mark: now,
                samples: Vec::new(),
            }),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn resident_memory_mb(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|p| p.memory() / 1024 / 1024)
    }

    /// Closes the current stage: time since the previous mark plus memory now.
    pub fn record_stage(&self, stage: &str) -> Option<StageSample> {
        if !self.enabled {
            return None;
        }

        let memory_mb = self.resident_memory_mb().unwrap_or(0);
        let mut timeline = self.timeline.lock().ok()?;
        let now = Instant::now();
        let sample = StageSample {
            stage: stage.to_string(),
            elapsed: now.duration_since(timeline.last_mark),
            memory_mb,
        };
        timeline.last_mark = now;
        timeline.samples.push(sample.clone());

        tracing::info!("📊 {} took {:?}, memory {}MB", stage, sample.elapsed, memory_mb);
        Some(sample)
    }

    pub fn samples(&self) -> Vec<StageSample> {
        self.timeline
            .lock()
            .map(|t| t.samples.clone())
            .unwrap_or_default()
    }

    pub fn log_summary(&self) {
        let samples = self.samples();
        if let Some((slowest, peak)) = summarize(&samples) {
            tracing::info!(
                "📊 Run took {:?}; slowest stage: {} ({:?}); peak memory {}MB after {}",
                self.started.elapsed(),
                slowest.stage,
                slowest.elapsed,
                peak.memory_mb,
                peak.stage
            );
        }
    }
}

// 非 CLI 建置沒有 sysinfo，提供空實作
#[cfg(not(feature = "cli"))]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn is_enabled(&self) -> bool {
        false
    }

    pub fn record_stage(&self, _stage: &str) -> Option<StageSample> {
        None
    }

    pub fn samples(&self) -> Vec<StageSample> {
        Vec::new()
    }

    pub fn log_summary(&self) {}
}
