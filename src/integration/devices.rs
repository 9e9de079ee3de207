//! Resolved device handles for one pass

use crate::error::Result;
use crate::nexx_client::MultiviewerDevice;
use crate::quartz_client::RouterDevice;
use async_trait::async_trait;
use std::sync::Arc;

/// A router plus the input/output ranges to poll
#[derive(Clone)]
pub struct RouterTarget {
    pub device: Arc<dyn RouterDevice>,
    pub max_inputs: u32,
    pub max_outputs: u32,
}

/// The devices configured right now. Either side may be absent.
#[derive(Clone, Default)]
pub struct DeviceSet {
    pub nexx: Option<Arc<dyn MultiviewerDevice>>,
    pub quartz: Option<RouterTarget>,
}

impl DeviceSet {
    pub fn is_empty(&self) -> bool {
        self.nexx.is_none() && self.quartz.is_none()
    }
}

/// Source of device handles
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    async fn devices(&self) -> Result<DeviceSet>;
}

/// A fixed set of devices
#[async_trait]
impl DeviceProvider for DeviceSet {
    async fn devices(&self) -> Result<DeviceSet> {
        Ok(self.clone())
    }
}
