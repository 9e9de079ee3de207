//! Operator push operations
//!
//! Every operation writes to the device first and updates the local mirror
//! only after the device accepted the command.

use crate::error::{Error, Result};
use crate::integration::{DeviceProvider, RouterTarget};
use crate::mv_state::{RoutingEntry, StateStore, UmdLayer};
use crate::nexx_client::mappings::{label_for, options_for, BORDER_PIXELS, PCM_BARS};
use crate::nexx_client::varid::{MAX_LAYOUTS, MAX_UMD_LAYERS, UMD_FIELDS};
use crate::nexx_client::{BatchPlanner, DeviceValue, MultiviewerDevice, ParameterAddress, VarId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Per-unit settings change; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MvParamsUpdate {
    pub font: Option<i64>,
    pub outer_border: Option<i64>,
    pub inner_border: Option<i64>,
    pub output_format: Option<i64>,
}

/// Per-window change. `pcm_bars` is a display value; `umd[n]` holds the
/// fields to change on layer `n`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowUpdate {
    pub pcm_bars: Option<i64>,
    pub umd: Option<Vec<UmdLayer>>,
}

/// Fields an operator can set from a fixed list
const ENUMERATED_FIELDS: [VarId; 5] = [
    VarId::MvFont,
    VarId::MvOuterBorder,
    VarId::MvInnerBorder,
    VarId::MvOutputFormat,
    VarId::UmdSelection,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOption {
    pub value: i64,
    pub label: String,
}

/// Selectable values of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldOptions {
    pub varid: VarId,
    pub options: Vec<FieldOption>,
}

/// Values accepted by the push operations, for the operator UI. PCM bars
/// are listed as display values.
pub fn field_options() -> Vec<FieldOptions> {
    let mut fields: Vec<FieldOptions> = ENUMERATED_FIELDS
        .iter()
        .map(|varid| FieldOptions {
            varid: *varid,
            options: options_for(*varid)
                .into_iter()
                .map(|(value, label)| FieldOption {
                    value,
                    label: label.to_string(),
                })
                .collect(),
        })
        .collect();

    fields.push(FieldOptions {
        varid: VarId::PcmBars,
        options: PCM_BARS
            .values()
            .iter()
            .map(|v| FieldOption {
                value: *v,
                label: v.to_string(),
            })
            .collect(),
    });
    fields
}

/// MV Control Service
pub struct MvControlService {
    store: Arc<dyn StateStore>,
    devices: Arc<dyn DeviceProvider>,
    planner: BatchPlanner,
}

impl MvControlService {
    pub fn new(store: Arc<dyn StateStore>, devices: Arc<dyn DeviceProvider>) -> Self {
        Self {
            store,
            devices,
            planner: BatchPlanner::new(),
        }
    }

    async fn nexx(&self) -> Result<Arc<dyn MultiviewerDevice>> {
        self.devices
            .devices()
            .await?
            .nexx
            .ok_or_else(|| Error::Configuration("NEXX not configured".to_string()))
    }

    async fn quartz(&self) -> Result<RouterTarget> {
        self.devices
            .devices()
            .await?
            .quartz
            .ok_or_else(|| Error::Configuration("Quartz not configured".to_string()))
    }

    async fn write(
        &self,
        device: &dyn MultiviewerDevice,
        values: Vec<(ParameterAddress, DeviceValue)>,
    ) -> Result<()> {
        let addresses: Vec<_> = values.iter().map(|(a, _)| a.clone()).collect();
        for chunk in self.planner.chunk(&addresses) {
            let batch: Vec<_> = values
                .iter()
                .filter(|(a, _)| chunk.contains(a))
                .cloned()
                .collect();
            device.set_parameters(&batch).await?;
        }
        Ok(())
    }

    // ========================================
    // NEXX
    // ========================================

    /// Change a unit's layout
    pub async fn set_layout(&self, mv_index: u32, layout: i64) -> Result<()> {
        if !(0..i64::from(MAX_LAYOUTS)).contains(&layout) {
            return Err(Error::Validation(format!(
                "Layout {} out of range (0-{})",
                layout,
                MAX_LAYOUTS - 1
            )));
        }
        let address = ParameterAddress::mv(VarId::MvLayout, mv_index)?;

        let device = self.nexx().await?;
        device.set_parameter(&address, &DeviceValue::Int(layout)).await?;
        info!(mv = mv_index, layout = layout, "Layout set");

        if let Some(mv) = self.store.get_multiviewer_by_index(mv_index).await? {
            if let Some(mut settings) = self.store.get_mv_settings(mv.id).await? {
                settings.layout = layout;
                self.store.upsert_mv_settings(mv.id, &settings).await?;
            }
        }
        Ok(())
    }

    /// Change font, borders and output format in one request
    pub async fn set_mv_params(&self, mv_index: u32, update: &MvParamsUpdate) -> Result<()> {
        let fields = [
            (VarId::MvFont, update.font),
            (VarId::MvOuterBorder, update.outer_border),
            (VarId::MvInnerBorder, update.inner_border),
            (VarId::MvOutputFormat, update.output_format),
        ];

        let mut values = Vec::new();
        for (varid, value) in fields {
            let Some(value) = value else { continue };
            let wire = match varid {
                VarId::MvOuterBorder | VarId::MvInnerBorder => BORDER_PIXELS
                    .contains_value(value)
                    .then(|| BORDER_PIXELS.value_to_index(value)),
                _ => label_for(varid, value).map(|_| value),
            };
            let Some(wire) = wire else {
                return Err(Error::Validation(format!(
                    "Invalid value {} for VarID {}",
                    value, varid
                )));
            };
            values.push((ParameterAddress::mv(varid, mv_index)?, DeviceValue::Int(wire)));
        }
        if values.is_empty() {
            return Ok(());
        }

        let device = self.nexx().await?;
        self.write(device.as_ref(), values).await?;
        info!(mv = mv_index, "MV params set");

        if let Some(mv) = self.store.get_multiviewer_by_index(mv_index).await? {
            if let Some(mut settings) = self.store.get_mv_settings(mv.id).await? {
                if let Some(v) = update.font {
                    settings.font = v;
                }
                if let Some(v) = update.outer_border {
                    settings.outer_border = v;
                }
                if let Some(v) = update.inner_border {
                    settings.inner_border = v;
                }
                if let Some(v) = update.output_format {
                    settings.output_format = v;
                }
                self.store.upsert_mv_settings(mv.id, &settings).await?;
            }
        }
        Ok(())
    }

    /// Change a window's PCM bars and/or UMD fields. UMD changes are merged
    /// into the cached layers; untouched layers and fields are kept.
    pub async fn set_window(
        &self,
        mv_index: u32,
        window: u32,
        update: &WindowUpdate,
    ) -> Result<()> {
        let mut values = Vec::new();

        let pcm_display = match update.pcm_bars {
            Some(display) => {
                let index = PCM_BARS.value_to_index(display);
                values.push((
                    ParameterAddress::window(VarId::PcmBars, mv_index, window)?,
                    DeviceValue::Int(index),
                ));
                Some(PCM_BARS.index_to_value(index))
            }
            None => None,
        };

        if let Some(layers) = &update.umd {
            if layers.len() > MAX_UMD_LAYERS as usize {
                return Err(Error::Validation(format!(
                    "{} UMD layers given, at most {} allowed",
                    layers.len(),
                    MAX_UMD_LAYERS
                )));
            }
            for (layer, fields) in layers.iter().enumerate() {
                for (varid, value) in fields {
                    if !UMD_FIELDS.contains(varid) {
                        return Err(Error::Validation(format!(
                            "VarID {} is not a UMD field",
                            varid
                        )));
                    }
                    values.push((
                        ParameterAddress::umd(*varid, mv_index, window, layer as u32)?,
                        value.clone(),
                    ));
                }
            }
        }

        if values.is_empty() {
            // Still validates the window address
            ParameterAddress::window(VarId::PcmBars, mv_index, window)?;
            return Ok(());
        }

        let device = self.nexx().await?;
        self.write(device.as_ref(), values).await?;
        info!(mv = mv_index, window = window, "Window set");

        let Some(mv) = self.store.get_multiviewer_by_index(mv_index).await? else {
            return Ok(());
        };
        let Some(mut state) = self.store.get_window_state(mv.id, window).await? else {
            return Ok(());
        };

        if let Some(display) = pcm_display {
            state.pcm_bars = display;
        }
        if let Some(layers) = &update.umd {
            while state.umd.len() < MAX_UMD_LAYERS as usize {
                state.umd.push(UmdLayer::new());
            }
            for (cached, fields) in state.umd.iter_mut().zip(layers) {
                cached.extend(fields.iter().map(|(k, v)| (*k, v.clone())));
            }
        }
        self.store.upsert_window_state(mv.id, &state).await
    }

    // ========================================
    // Quartz
    // ========================================

    /// Route `input` to `output`. The mirror changes only after the router
    /// accepted the switch.
    pub async fn switch_route(&self, output: u32, input: u32) -> Result<RoutingEntry> {
        if output == 0 || input == 0 {
            return Err(Error::Validation("Router ports are numbered from 1".to_string()));
        }

        let target = self.quartz().await?;
        if output > target.max_outputs || input > target.max_inputs {
            return Err(Error::Validation(format!(
                "Route {} -> {} outside router size ({} in / {} out)",
                input, output, target.max_inputs, target.max_outputs
            )));
        }

        target.device.switch(output, input).await?;

        let now = Utc::now();
        self.store.upsert_routing(output, Some(input), now).await?;
        info!(output = output, input = input, "Route switched");

        Ok(RoutingEntry {
            output,
            input: Some(input),
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::DeviceSet;
    use crate::mv_state::{MemoryStateStore, MvSettings, WindowState};
    use crate::quartz_client::RouterDevice;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNexx {
        writes: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MultiviewerDevice for RecordingNexx {
        async fn get_parameter(&self, _: &ParameterAddress) -> Result<Option<DeviceValue>> {
            Ok(None)
        }

        async fn get_parameters(
            &self,
            _: &[ParameterAddress],
        ) -> Result<crate::nexx_client::ParameterValues> {
            Ok(Default::default())
        }

        async fn set_parameter(
            &self,
            address: &ParameterAddress,
            value: &DeviceValue,
        ) -> Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((address.to_string(), value.to_wire()));
            Ok(())
        }

        async fn set_parameters(&self, values: &[(ParameterAddress, DeviceValue)]) -> Result<()> {
            let mut writes = self.writes.lock().unwrap();
            for (a, v) in values {
                writes.push((a.to_string(), v.to_wire()));
            }
            Ok(())
        }
    }

    struct LockedRouter;

    #[async_trait]
    impl RouterDevice for LockedRouter {
        async fn read_input_name(&self, _: u32) -> Result<String> {
            Ok(String::new())
        }
        async fn read_output_name(&self, _: u32) -> Result<String> {
            Ok(String::new())
        }
        async fn read_routing(&self, _: u32) -> Result<Option<u32>> {
            Ok(None)
        }
        async fn switch(&self, output: u32, _: u32) -> Result<()> {
            if output == 8 {
                Err(Error::OutputLocked { output })
            } else {
                Ok(())
            }
        }
    }

    async fn setup() -> (Arc<MemoryStateStore>, Arc<RecordingNexx>, MvControlService) {
        let store = Arc::new(MemoryStateStore::new());
        let nexx = Arc::new(RecordingNexx::default());
        let devices = DeviceSet {
            nexx: Some(nexx.clone()),
            quartz: Some(RouterTarget {
                device: Arc::new(LockedRouter),
                max_inputs: 16,
                max_outputs: 16,
            }),
        };

        let mv = store.ensure_multiviewer(2).await.unwrap();
        store.upsert_mv_settings(mv.id, &MvSettings::default()).await.unwrap();
        let mut layer0 = UmdLayer::new();
        layer0.insert(VarId::UmdText, DeviceValue::from("OLD"));
        layer0.insert(VarId::UmdBoxX, DeviceValue::Int(5));
        let mut layer2 = UmdLayer::new();
        layer2.insert(VarId::UmdText, DeviceValue::from("KEEP"));
        store
            .upsert_window_state(
                mv.id,
                &WindowState {
                    window_index: 4,
                    pcm_bars: 0,
                    umd: vec![layer0, UmdLayer::new(), layer2],
                },
            )
            .await
            .unwrap();

        let service = MvControlService::new(store.clone(), Arc::new(devices));
        (store, nexx, service)
    }

    #[tokio::test]
    async fn test_set_layout_writes_and_updates_cache() {
        let (store, nexx, service) = setup().await;
        service.set_layout(2, 12).await.unwrap();

        assert_eq!(nexx.writes.lock().unwrap().clone(), vec![("2704.2".into(), "12".into())]);
        let mv = store.get_multiviewer_by_index(2).await.unwrap().unwrap();
        assert_eq!(store.get_mv_settings(mv.id).await.unwrap().unwrap().layout, 12);

        assert!(matches!(service.set_layout(2, 43).await, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_set_mv_params_batches_present_fields() {
        let (store, nexx, service) = setup().await;
        let update = MvParamsUpdate {
            font: Some(2),
            inner_border: Some(3),
            ..Default::default()
        };
        service.set_mv_params(2, &update).await.unwrap();

        assert_eq!(
            nexx.writes.lock().unwrap().clone(),
            vec![("2716.2".into(), "2".into()), ("2727.2".into(), "3".into())]
        );
        let mv = store.get_multiviewer_by_index(2).await.unwrap().unwrap();
        let settings = store.get_mv_settings(mv.id).await.unwrap().unwrap();
        assert_eq!((settings.font, settings.inner_border, settings.outer_border), (2, 3, 0));

        let bad = MvParamsUpdate {
            outer_border: Some(9),
            ..Default::default()
        };
        assert!(service.set_mv_params(2, &bad).await.is_err());
    }

    #[tokio::test]
    async fn test_set_window_translates_pcm_and_merges_umd() {
        let (store, nexx, service) = setup().await;
        let mut layer0 = UmdLayer::new();
        layer0.insert(VarId::UmdText, DeviceValue::from("CAM 4"));
        let update = WindowUpdate {
            pcm_bars: Some(12),
            umd: Some(vec![layer0]),
        };
        service.set_window(2, 4, &update).await.unwrap();

        assert_eq!(
            nexx.writes.lock().unwrap().clone(),
            vec![
                ("2719.2.4".into(), "5".into()),
                ("2709.2.4.0".into(), "CAM 4".into()),
            ]
        );

        let mv = store.get_multiviewer_by_index(2).await.unwrap().unwrap();
        let state = store.get_window_state(mv.id, 4).await.unwrap().unwrap();
        assert_eq!(state.pcm_bars, 12);
        assert_eq!(state.umd[0][&VarId::UmdText], DeviceValue::from("CAM 4"));
        assert_eq!(state.umd[0][&VarId::UmdBoxX], DeviceValue::Int(5));
        assert_eq!(state.umd[2][&VarId::UmdText], DeviceValue::from("KEEP"));
    }

    #[tokio::test]
    async fn test_border_params_are_written_as_table_index() {
        let (_, nexx, service) = setup().await;
        let update = MvParamsUpdate {
            outer_border: Some(4),
            ..Default::default()
        };
        service.set_mv_params(2, &update).await.unwrap();

        let expected = BORDER_PIXELS.value_to_index(4).to_string();
        assert_eq!(nexx.writes.lock().unwrap().clone(), vec![("2726.2".into(), expected)]);

        let negative = MvParamsUpdate {
            inner_border: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            service.set_mv_params(2, &negative).await,
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_field_options_cover_push_fields() {
        let options = field_options();
        let font = options.iter().find(|f| f.varid == VarId::MvFont).unwrap();
        assert_eq!(font.options[2].label, "D Din");

        let pcm = options.iter().find(|f| f.varid == VarId::PcmBars).unwrap();
        let values: Vec<i64> = pcm.options.iter().map(|o| o.value).collect();
        assert_eq!(values, vec![0, 2, 4, 6, 8, 12, 16]);

        let border = options.iter().find(|f| f.varid == VarId::MvOuterBorder).unwrap();
        assert!(border.options.iter().all(|o| BORDER_PIXELS.contains_value(o.value)));
    }

    #[tokio::test]
    async fn test_set_window_rejects_non_umd_fields() {
        let (_, nexx, service) = setup().await;
        let mut layer = UmdLayer::new();
        layer.insert(VarId::MvLayout, DeviceValue::Int(1));
        let update = WindowUpdate {
            pcm_bars: None,
            umd: Some(vec![layer]),
        };
        assert!(matches!(
            service.set_window(2, 4, &update).await,
            Err(Error::Validation(_))
        ));
        assert!(nexx.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_switch_route_updates_mirror_only_on_success() {
        let (store, _, service) = setup().await;

        let entry = service.switch_route(3, 7).await.unwrap();
        assert_eq!(entry.input, Some(7));
        assert_eq!(store.get_routing(3).await.unwrap().unwrap().input, Some(7));

        let err = service.switch_route(8, 7).await.unwrap_err();
        assert!(matches!(err, Error::OutputLocked { output: 8 }));
        assert!(store.get_routing(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_integration_is_configuration_error() {
        let store = Arc::new(MemoryStateStore::new());
        let service = MvControlService::new(store, Arc::new(DeviceSet::default()));
        assert!(matches!(service.set_layout(0, 1).await, Err(Error::Configuration(_))));
        assert!(matches!(service.switch_route(1, 1).await, Err(Error::Configuration(_))));
    }
}
