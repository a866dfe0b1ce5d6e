//! Worker Pools
//!
//! Bounds how many generation jobs run at once. CPU jobs share one pool;
//! GPU jobs additionally hold an exclusive accelerator index for their whole
//! run, which is passed to the model server as the "GPU ID".

use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{Result, VoiceCacheError};

#[derive(Debug)]
struct GpuPool {
    permits: Arc<Semaphore>,
    /// Indices not currently leased
    free: Arc<Mutex<Vec<usize>>>,
}

/// The CPU pool and the optional GPU pool.
#[derive(Debug, Clone)]
pub struct WorkerPools {
    cpu: Arc<Semaphore>,
    gpu: Option<Arc<GpuPool>>,
}

/// Permission to run one job. Released on drop.
#[derive(Debug)]
pub struct WorkerLease {
    _permit: OwnedSemaphorePermit,
    gpu_id: Option<usize>,
    free: Option<Arc<Mutex<Vec<usize>>>>,
}

impl WorkerLease {
    /// Accelerator assigned to this job, if any.
    pub fn gpu_id(&self) -> Option<usize> {
        self.gpu_id
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        if let (Some(id), Some(free)) = (self.gpu_id, &self.free) {
            if let Ok(mut free) = free.lock() {
                free.push(id);
            }
            debug!("Released GPU {}", id);
        }
    }
}

impl WorkerPools {
    /// A zero CPU worker count is raised to one so CPU jobs can still run.
    pub fn new(cpu_workers: usize, gpu_workers: usize) -> Self {
        let gpu = (gpu_workers > 0).then(|| {
            Arc::new(GpuPool {
                permits: Arc::new(Semaphore::new(gpu_workers)),
                // reversed so index 0 is leased first
                free: Arc::new(Mutex::new((0..gpu_workers).rev().collect())),
            })
        });
        Self {
            cpu: Arc::new(Semaphore::new(cpu_workers.max(1))),
            gpu,
        }
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    /// Waits for a free worker of the requested kind.
    pub async fn acquire(&self, use_gpu: bool) -> Result<WorkerLease> {
        if !use_gpu {
            let permit = self.cpu.clone().acquire_owned().await.map_err(closed)?;
            return Ok(WorkerLease {
                _permit: permit,
                gpu_id: None,
                free: None,
            });
        }

        let pool = self.gpu.as_ref().ok_or_else(|| {
            VoiceCacheError::InvalidRequest("no GPU workers are configured".to_string())
        })?;
        let permit = pool.permits.clone().acquire_owned().await.map_err(closed)?;
        let gpu_id = pool
            .free
            .lock()
            .map_err(|_| VoiceCacheError::Internal("GPU index list poisoned".to_string()))?
            .pop()
            .ok_or_else(|| VoiceCacheError::Internal("GPU permit without a free index".to_string()))?;
        debug!("Leased GPU {}", gpu_id);

        Ok(WorkerLease {
            _permit: permit,
            gpu_id: Some(gpu_id),
            free: Some(pool.free.clone()),
        })
    }
}

fn closed(_: tokio::sync::AcquireError) -> VoiceCacheError {
    VoiceCacheError::Internal("worker pool closed".to_string())
}
