//! Batch planning for the 40-parameter request ceiling
//!
//! UMD fields belonging to one (multiviewer, window, layer) are treated as an
//! indivisible unit so a layer is always read from a single device reply.

use super::codec::{is_umd_address, ParameterAddress};
use super::varid::{
    VarId, MAX_BATCH_PARAMS, MAX_UMD_LAYERS, MAX_WINDOWS_PER_MV, MV_SETTINGS_FIELDS, UMD_FIELDS,
};
use crate::error::Result;
use std::collections::{HashMap, HashSet};

/// Windows covered by one UMD batch (10 fields x 4 windows = 40)
pub const UMD_WINDOW_BLOCK: u32 = (MAX_BATCH_PARAMS / UMD_FIELDS.len()) as u32;

/// Splits address lists into device-sized requests
#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
    limit: usize,
}

impl Default for BatchPlanner {
    fn default() -> Self {
        Self {
            limit: MAX_BATCH_PARAMS,
        }
    }
}

impl BatchPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Chunk an arbitrary address list.
    ///
    /// Duplicates are dropped, first-appearance order is kept, and each
    /// window's UMD layer stays inside one chunk.
    pub fn chunk(&self, addresses: &[ParameterAddress]) -> Vec<Vec<ParameterAddress>> {
        let mut seen = HashSet::new();
        let mut units: Vec<Vec<ParameterAddress>> = Vec::new();
        let mut umd_units: HashMap<(u32, u32, u32), usize> = HashMap::new();

        for address in addresses {
            if !seen.insert(address.clone()) {
                continue;
            }

            if is_umd_address(address) {
                let key = (
                    address.mv_index().unwrap_or_default(),
                    address.window_index().unwrap_or_default(),
                    address.layer_index().unwrap_or_default(),
                );
                match umd_units.get(&key) {
                    Some(&slot) => units[slot].push(address.clone()),
                    None => {
                        umd_units.insert(key, units.len());
                        units.push(vec![address.clone()]);
                    }
                }
            } else {
                units.push(vec![address.clone()]);
            }
        }

        let mut chunks: Vec<Vec<ParameterAddress>> = Vec::new();
        let mut current: Vec<ParameterAddress> = Vec::new();

        for unit in units {
            if !current.is_empty() && current.len() + unit.len() > self.limit {
                chunks.push(std::mem::take(&mut current));
            }
            current.extend(unit);
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// Enable flags (2703.n) for the first `count` units
    pub fn enabled_flag_batches(&self, count: u32) -> Result<Vec<Vec<ParameterAddress>>> {
        let addresses = (0..count)
            .map(|mv| ParameterAddress::mv(VarId::MvEnable, mv))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.chunk(&addresses))
    }

    /// Settings fields of one unit (a single request)
    pub fn mv_settings_batch(&self, mv: u32) -> Result<Vec<ParameterAddress>> {
        MV_SETTINGS_FIELDS
            .iter()
            .map(|varid| ParameterAddress::mv(*varid, mv))
            .collect()
    }

    /// PCM bars of all 16 windows of one unit (a single request)
    pub fn pcm_batch(&self, mv: u32) -> Result<Vec<ParameterAddress>> {
        (0..MAX_WINDOWS_PER_MV)
            .map(|window| ParameterAddress::window(VarId::PcmBars, mv, window))
            .collect()
    }

    /// UMD fields of one unit grouped by (layer, 4-window block):
    /// 3 layers x 4 blocks = 12 requests of exactly 40 parameters.
    pub fn umd_layer_batches(&self, mv: u32) -> Result<Vec<Vec<ParameterAddress>>> {
        let mut batches =
            Vec::with_capacity((MAX_UMD_LAYERS * MAX_WINDOWS_PER_MV / UMD_WINDOW_BLOCK) as usize);

        for layer in 0..MAX_UMD_LAYERS {
            for block_start in (0..MAX_WINDOWS_PER_MV).step_by(UMD_WINDOW_BLOCK as usize) {
                let mut batch = Vec::with_capacity(MAX_BATCH_PARAMS);
                for window in block_start..block_start + UMD_WINDOW_BLOCK {
                    for varid in UMD_FIELDS {
                        batch.push(ParameterAddress::umd(varid, mv, window, layer)?);
                    }
                }
                batches.push(batch);
            }
        }

        Ok(batches)
    }
}
