//! NEXX pass: inventory discovery and per-unit sync

use super::types::RefreshScope;
use crate::error::{Error, Result};
use crate::mv_state::{MvSettings, NexxSyncResult, StateStore, UmdLayer, WindowState};
use crate::nexx_client::codec::{normalize_field, normalize_flag, normalize_int};
use crate::nexx_client::mappings::{BORDER_PIXELS, PCM_BARS};
use crate::nexx_client::varid::{MAX_MULTIVIEWERS, MAX_UMD_LAYERS, MAX_WINDOWS_PER_MV, UMD_FIELDS};
use crate::nexx_client::{BatchPlanner, MultiviewerDevice, ParameterAddress, ParameterValues, VarId};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

/// Units assumed enabled when the enable flags cannot be read
pub const FALLBACK_ENABLED: [u32; 3] = [0, 1, 2];

pub struct NexxSync<'a> {
    device: &'a dyn MultiviewerDevice,
    store: &'a dyn StateStore,
    planner: BatchPlanner,
}

impl<'a> NexxSync<'a> {
    pub fn new(device: &'a dyn MultiviewerDevice, store: &'a dyn StateStore) -> Self {
        Self {
            device,
            store,
            planner: BatchPlanner::new(),
        }
    }

    /// Run the pass. Fails only when the enabled-unit count cannot be read;
    /// per-unit failures are collected in the result.
    pub async fn run(&self, scope: &RefreshScope) -> Result<NexxSyncResult> {
        let count = self.enabled_count().await?;
        info!(count = count, "[NEXX Sync] Enabled MV count");

        let enabled = match self.enabled_units(count).await {
            Ok(enabled) => enabled,
            Err(e) => {
                let fallback: BTreeSet<u32> =
                    FALLBACK_ENABLED.iter().copied().filter(|i| *i < count).collect();
                warn!(
                    error = %e,
                    fallback = ?fallback,
                    "[NEXX Sync] Enable flags unavailable, using fallback"
                );
                fallback
            }
        };

        let targets: Vec<u32> = enabled.into_iter().filter(|i| scope.allows_mv(*i)).collect();
        info!(targets = ?targets, "[NEXX Sync] Units to sync");

        let mut result = NexxSyncResult::default();
        for index in targets {
            match self.sync_unit(index).await {
                Ok(()) => result.mvs_synced += 1,
                Err(e) => {
                    error!(mv = index, error = %e, "[NEXX Sync] Failed to sync MV");
                    result.errors.push(format!("MV {}: {}", index, e));
                }
            }
        }

        info!(
            synced = result.mvs_synced,
            failed = result.errors.len(),
            "[NEXX Sync] Complete"
        );
        Ok(result)
    }

    async fn enabled_count(&self) -> Result<u32> {
        let address = ParameterAddress::system(VarId::EnabledMvs)?;
        let raw = self.device.get_parameter(&address).await?;

        let raw = match raw {
            Some(v) if !v.is_blank() => v,
            _ => {
                return Err(Error::Protocol(
                    "NEXX returned an empty MV count; check API access and key".to_string(),
                ))
            }
        };

        let count = raw.as_int().ok_or_else(|| {
            Error::Protocol(format!("NEXX returned invalid count value: {:?}", raw.to_wire()))
        })?;

        Ok(count.clamp(0, i64::from(MAX_MULTIVIEWERS)) as u32)
    }

    async fn enabled_units(&self, count: u32) -> Result<BTreeSet<u32>> {
        let mut values = ParameterValues::new();
        for batch in self.planner.enabled_flag_batches(count)? {
            values.extend(self.device.get_parameters(&batch).await?);
        }

        let mut enabled = BTreeSet::new();
        for index in 0..count {
            let address = ParameterAddress::mv(VarId::MvEnable, index)?;
            if normalize_flag(values.get(&address))? {
                enabled.insert(index);
            }
        }
        Ok(enabled)
    }

    /// Fetch everything for one unit, then write it
    async fn sync_unit(&self, index: u32) -> Result<()> {
        debug!(mv = index, "[NEXX Sync] Syncing MV");
        let mv = self.store.ensure_multiviewer(index).await?;

        let settings_values = self
            .device
            .get_parameters(&self.planner.mv_settings_batch(index)?)
            .await?;
        let pcm_values = self.device.get_parameters(&self.planner.pcm_batch(index)?).await?;

        let mut umd_values = ParameterValues::new();
        for batch in self.planner.umd_layer_batches(index)? {
            umd_values.extend(self.device.get_parameters(&batch).await?);
        }

        let settings = Self::settings_from(index, &settings_values)?;
        let windows = (0..MAX_WINDOWS_PER_MV)
            .map(|window| Self::window_from(index, window, &pcm_values, &umd_values))
            .collect::<Result<Vec<_>>>()?;

        self.store.upsert_mv_settings(mv.id, &settings).await?;
        for window in &windows {
            self.store.upsert_window_state(mv.id, window).await?;
        }

        Ok(())
    }

    fn settings_from(index: u32, values: &ParameterValues) -> Result<MvSettings> {
        let field = |varid: VarId| -> Result<i64> {
            normalize_int(values.get(&ParameterAddress::mv(varid, index)?))
        };

        Ok(MvSettings {
            layout: field(VarId::MvLayout)?,
            font: field(VarId::MvFont)?,
            outer_border: BORDER_PIXELS.index_to_value(field(VarId::MvOuterBorder)?),
            inner_border: BORDER_PIXELS.index_to_value(field(VarId::MvInnerBorder)?),
            output_format: field(VarId::MvOutputFormat)?,
        })
    }

    fn window_from(
        index: u32,
        window: u32,
        pcm_values: &ParameterValues,
        umd_values: &ParameterValues,
    ) -> Result<WindowState> {
        let pcm_address = ParameterAddress::window(VarId::PcmBars, index, window)?;
        let pcm_index = normalize_int(pcm_values.get(&pcm_address))?;

        let umd = (0..MAX_UMD_LAYERS)
            .map(|layer| {
                UMD_FIELDS
                    .iter()
                    .map(|varid| {
                        let address = ParameterAddress::umd(*varid, index, window, layer)?;
                        Ok((*varid, normalize_field(*varid, umd_values.get(&address))))
                    })
                    .collect::<Result<UmdLayer>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(WindowState {
            window_index: window,
            pcm_bars: PCM_BARS.index_to_value(pcm_index),
            umd,
        })
    }
}
