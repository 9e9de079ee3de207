//! Synced state types

use crate::error::{Error, Result};
use crate::nexx_client::{DeviceValue, VarId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ========================================
// Entities
// ========================================

/// Multiviewer unit, keyed by its chassis index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multiviewer {
    pub id: i64,
    pub nexx_index: u32,
    pub label: String,
    pub enabled: bool,
}

impl Multiviewer {
    /// Label given to units created by sync
    pub fn default_label(nexx_index: u32) -> String {
        format!("MV {}", nexx_index + 1)
    }
}

/// Per-unit settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MvSettings {
    pub layout: i64,
    pub font: i64,
    pub outer_border: i64,
    pub inner_border: i64,
    pub output_format: i64,
}

/// One UMD layer: field VarID -> normalized value
pub type UmdLayer = BTreeMap<VarId, DeviceValue>;

/// Per-window state. `pcm_bars` is the display value, not the wire index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    pub window_index: u32,
    pub pcm_bars: i64,
    pub umd: Vec<UmdLayer>,
}

/// Router source (input) label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub input: u32,
    pub label: String,
}

/// Router output assignment; `input == None` means unrouted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub output: u32,
    pub input: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

// ========================================
// Refresh lock
// ========================================

/// The single refresh lock row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub is_running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub started_by: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<RefreshResult>,
}

/// Request to take the lock
#[derive(Debug, Clone)]
pub struct RefreshClaim {
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    pub cooldown: Duration,
    /// Running locks older than this may be taken over
    pub stale_after: Option<Duration>,
}

/// Outcome of a successful lock check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    Acquire,
    /// Previous holder never released; its lock is past the stale threshold
    TakeOverStale,
}

impl RefreshStatus {
    /// Decide whether `claim` may take the lock in its current state
    pub fn check_claim(&self, claim: &RefreshClaim) -> Result<ClaimDecision> {
        let now = claim.started_at;

        if self.is_running {
            let stale = match (claim.stale_after, self.started_at) {
                (Some(limit), Some(started)) => now - started >= limit,
                _ => false,
            };
            if stale {
                return Ok(ClaimDecision::TakeOverStale);
            }
            return Err(Error::Conflict(format!(
                "Refresh already in progress (started by {} at {})",
                self.started_by.as_deref().unwrap_or("unknown"),
                self.started_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown time".to_string())
            )));
        }

        if let Some(finished) = self.finished_at {
            let elapsed = now - finished;
            if elapsed < claim.cooldown {
                let remaining = claim.cooldown - elapsed;
                let mut secs = remaining.num_seconds();
                if remaining > Duration::seconds(secs) {
                    secs += 1;
                }
                return Err(Error::Throttled {
                    retry_after_secs: secs.max(1),
                });
            }
        }

        Ok(ClaimDecision::Acquire)
    }
}

// ========================================
// Result document
// ========================================

/// Per-integration outcome: either the pass ran (possibly with item
/// errors) or it could not start at all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubResult<T> {
    Failed { error: String },
    Completed(T),
}

impl<T> SubResult<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            SubResult::Completed(t) => Some(t),
            SubResult::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NexxSyncResult {
    pub mvs_synced: u32,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuartzSyncResult {
    pub sources_synced: u32,
    pub routes_synced: u32,
    pub errors: Vec<String>,
}

/// Result document stored on the lock row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshResult {
    pub timestamp: DateTime<Utc>,
    pub nexx: Option<SubResult<NexxSyncResult>>,
    pub quartz: Option<SubResult<QuartzSyncResult>>,
    pub errors: Vec<String>,
}

impl RefreshResult {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            nexx: None,
            quartz: None,
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn claim(now: DateTime<Utc>) -> RefreshClaim {
        RefreshClaim {
            started_by: "op".into(),
            started_at: now,
            cooldown: Duration::seconds(60),
            stale_after: None,
        }
    }

    #[test]
    fn test_running_lock_conflicts() {
        let status = RefreshStatus {
            is_running: true,
            started_at: Some(at(0)),
            started_by: Some("alice".into()),
            ..Default::default()
        };
        let err = status.check_claim(&claim(at(3600))).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_stale_lock_can_be_taken_over_when_enabled() {
        let status = RefreshStatus {
            is_running: true,
            started_at: Some(at(0)),
            ..Default::default()
        };
        let mut c = claim(at(600));
        c.stale_after = Some(Duration::seconds(900));
        assert!(status.check_claim(&c).is_err());

        c.started_at = at(900);
        assert_eq!(status.check_claim(&c).unwrap(), ClaimDecision::TakeOverStale);
    }

    #[test]
    fn test_cooldown_boundary() {
        let status = RefreshStatus {
            finished_at: Some(at(0)),
            ..Default::default()
        };
        match status.check_claim(&claim(at(59))) {
            Err(Error::Throttled { retry_after_secs }) => assert_eq!(retry_after_secs, 1),
            other => panic!("expected throttle, got {:?}", other),
        }
        match status.check_claim(&claim(at(1))) {
            Err(Error::Throttled { retry_after_secs }) => assert_eq!(retry_after_secs, 59),
            other => panic!("expected throttle, got {:?}", other),
        }
        assert_eq!(status.check_claim(&claim(at(60))).unwrap(), ClaimDecision::Acquire);
        assert_eq!(status.check_claim(&claim(at(61))).unwrap(), ClaimDecision::Acquire);
    }

    #[test]
    fn test_never_run_lock_is_free() {
        assert_eq!(
            RefreshStatus::default().check_claim(&claim(at(0))).unwrap(),
            ClaimDecision::Acquire
        );
    }

    #[test]
    fn test_result_document_shape() {
        let mut result = RefreshResult::new(at(0));
        result.nexx = Some(SubResult::Failed {
            error: "connection refused".into(),
        });
        result.quartz = Some(SubResult::Completed(QuartzSyncResult {
            sources_synced: 2,
            routes_synced: 1,
            errors: vec![],
        }));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["nexx"]["error"], "connection refused");
        assert_eq!(json["quartz"]["sources_synced"], 2);
        assert!(json["errors"].as_array().unwrap().is_empty());

        let back: RefreshResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_umd_layer_keys_are_wire_codes() {
        let mut layer = UmdLayer::new();
        layer.insert(VarId::UmdText, DeviceValue::Text("CAM".into()));
        layer.insert(VarId::UmdBoxX, DeviceValue::Int(10));
        let json = serde_json::to_string(&layer).unwrap();
        assert_eq!(json, r#"{"2709":"CAM","2712":10}"#);
    }
}
