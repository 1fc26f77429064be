//! Fakes shared by the engine and HTTP tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{SamplerError, SamplerResult, UpdateResult};
use crate::sampler::HostSampler;
use crate::update::{Vcs, VcsOutput};

/// Sampler returning fixed readings, or failing every call.
#[derive(Debug, Default)]
pub(crate) struct FakeSampler {
    pub cpu: f64,
    pub ram: f64,
    pub disk: f64,
    pub capacity_gb: f64,
    pub failing: bool,
    pub capacity_reads: AtomicUsize,
}

impl FakeSampler {
    pub fn fixed(cpu: f64, ram: f64, disk: f64) -> Self {
        Self { cpu, ram, disk, capacity_gb: 100.0, ..Self::default() }
    }

    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    fn read(&self, value: f64) -> SamplerResult<f64> {
        if self.failing {
            return Err(SamplerError::Unsupported { what: "fake sampler" });
        }
        Ok(value)
    }
}

impl HostSampler for FakeSampler {
    fn cpu_percent(&self) -> SamplerResult<f64> {
        self.read(self.cpu)
    }

    fn ram_percent(&self) -> SamplerResult<f64> {
        self.read(self.ram)
    }

    fn disk_percent(&self) -> SamplerResult<f64> {
        self.read(self.disk)
    }

    fn disk_capacity_gb(&self) -> SamplerResult<f64> {
        self.capacity_reads.fetch_add(1, Ordering::SeqCst);
        self.read(self.capacity_gb)
    }
}

/// A working copy one fast-forward behind its remote; every command succeeds.
#[derive(Debug, Default)]
pub(crate) struct BehindRemote {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Vcs for BehindRemote {
    async fn run(&self, args: &[&str]) -> UpdateResult<VcsOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stdout = match args {
            ["rev-parse", "HEAD"] => "aaaaaaaaaaaa",
            ["rev-parse", _] => "bbbbbbbbbbbb",
            _ => "",
        };
        Ok(VcsOutput {
            success: true,
            status: "exit status: 0".into(),
            stdout: stdout.into(),
            stderr: String::new(),
        })
    }
}
