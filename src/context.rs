//! Analysis Context
//!
//! Glycemic thresholds and display units, resolved once per invocation
//! and passed explicitly to every metric and pattern call.
//!
//! Resolution reads the remote status endpoint; an unreachable or
//! malformed response silently falls back to fixed defaults.

use crate::source::{RemoteSource, ServerStatus};
use serde::Serialize;

pub const DEFAULT_URGENT_LOW: i64 = 55;
pub const DEFAULT_TARGET_LOW: i64 = 70;
pub const DEFAULT_TARGET_HIGH: i64 = 180;
pub const DEFAULT_URGENT_HIGH: i64 = 250;

/// mg/dL per mmol/L
pub const MGDL_PER_MMOL: f64 = 18.0182;

/// Glycemic thresholds in mg/dL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub urgent_low: i64,
    pub target_low: i64,
    pub target_high: i64,
    pub urgent_high: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            urgent_low: DEFAULT_URGENT_LOW,
            target_low: DEFAULT_TARGET_LOW,
            target_high: DEFAULT_TARGET_HIGH,
            urgent_high: DEFAULT_URGENT_HIGH,
        }
    }
}

impl Thresholds {
    /// Whether a value lies in `[target_low, target_high]`
    pub fn in_range(&self, value: i64) -> bool {
        value >= self.target_low && value <= self.target_high
    }

    /// Below target
    pub fn is_low(&self, value: i64) -> bool {
        value < self.target_low
    }

    /// Above target
    pub fn is_high(&self, value: i64) -> bool {
        value > self.target_high
    }

    /// -1 below target, 0 in range, 1 above target
    pub fn range_indicator(&self, value: i64) -> i8 {
        if self.is_low(value) {
            -1
        } else if self.is_high(value) {
            1
        } else {
            0
        }
    }

    fn from_status(status: &ServerStatus) -> Self {
        let defaults = Self::default();
        let Some(t) = &status.settings.thresholds else {
            return defaults;
        };
        let pick = |v: Option<f64>, fallback: i64| v.map(|x| x.round() as i64).unwrap_or(fallback);

        Self {
            urgent_low: pick(t.bg_low, defaults.urgent_low),
            target_low: pick(t.bg_target_bottom, defaults.target_low),
            target_high: pick(t.bg_target_top, defaults.target_high),
            urgent_high: pick(t.bg_high, defaults.urgent_high),
        }
    }
}

/// Display unit for glucose values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GlucoseUnit {
    #[default]
    #[serde(rename = "mg/dL")]
    MgDl,
    #[serde(rename = "mmol/L")]
    MmolL,
}

impl GlucoseUnit {
    /// Parse a server `units` setting; anything starting with "mmol" is mmol/L
    pub fn from_setting(units: &str) -> Self {
        if units.to_lowercase().starts_with("mmol") {
            Self::MmolL
        } else {
            Self::MgDl
        }
    }

    /// Label used in outputs
    pub fn label(&self) -> &'static str {
        match self {
            Self::MgDl => "mg/dL",
            Self::MmolL => "mmol/L",
        }
    }

    /// Convert a mg/dL value for display
    ///
    /// Presentation only: callers must never feed the result back into
    /// GMI, CV or range classification.
    pub fn display(&self, value_mgdl: f64) -> f64 {
        match self {
            Self::MgDl => value_mgdl,
            Self::MmolL => crate::metrics::round_to(value_mgdl / MGDL_PER_MMOL, 1),
        }
    }
}

impl std::fmt::Display for GlucoseUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Thresholds and units for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct AnalysisContext {
    pub thresholds: Thresholds,
    pub unit: GlucoseUnit,
}

impl AnalysisContext {
    /// Context with explicit values
    pub fn new(thresholds: Thresholds, unit: GlucoseUnit) -> Self {
        Self { thresholds, unit }
    }

    /// Build from a server status response
    pub fn from_status(status: &ServerStatus) -> Self {
        Self {
            thresholds: Thresholds::from_status(status),
            unit: status
                .settings
                .units
                .as_deref()
                .map(GlucoseUnit::from_setting)
                .unwrap_or_default(),
        }
    }
}

/// Resolves the analysis context from a remote source
pub struct ThresholdsResolver<'a> {
    source: &'a dyn RemoteSource,
}

impl<'a> ThresholdsResolver<'a> {
    pub fn new(source: &'a dyn RemoteSource) -> Self {
        Self { source }
    }

    /// Fetch settings once; fall back to defaults on any failure
    pub async fn resolve(&self) -> AnalysisContext {
        match self.source.fetch_status().await {
            Ok(status) => {
                let ctx = AnalysisContext::from_status(&status);
                tracing::debug!(
                    unit = %ctx.unit,
                    target_low = ctx.thresholds.target_low,
                    target_high = ctx.thresholds.target_high,
                    "Resolved thresholds from server status"
                );
                ctx
            }
            Err(e) => {
                tracing::warn!(error = %e, "Server status unavailable, using default thresholds");
                AnalysisContext::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RemoteEntry, ServerSettings, ServerThresholds, SourceError};
    use async_trait::async_trait;

    struct StatusSource(Option<ServerStatus>);

    #[async_trait]
    impl RemoteSource for StatusSource {
        fn name(&self) -> &str {
            "status"
        }

        async fn fetch_entries(
            &self,
            _count: usize,
            _before: Option<i64>,
        ) -> Result<Vec<RemoteEntry>, SourceError> {
            Ok(Vec::new())
        }

        async fn fetch_latest(&self) -> Result<Option<RemoteEntry>, SourceError> {
            Ok(None)
        }

        async fn fetch_status(&self) -> Result<ServerStatus, SourceError> {
            self.0
                .clone()
                .ok_or_else(|| SourceError::ParseError("expected value at line 1".into()))
        }
    }

    #[test]
    fn test_defaults() {
        let t = Thresholds::default();
        assert_eq!((t.urgent_low, t.target_low, t.target_high, t.urgent_high), (55, 70, 180, 250));
        assert_eq!(AnalysisContext::default().unit, GlucoseUnit::MgDl);
    }

    #[test]
    fn test_range_helpers() {
        let t = Thresholds::default();
        assert!(t.in_range(70));
        assert!(t.in_range(180));
        assert!(t.is_low(69));
        assert!(t.is_high(181));
        assert_eq!(t.range_indicator(50), -1);
        assert_eq!(t.range_indicator(120), 0);
        assert_eq!(t.range_indicator(200), 1);
    }

    #[test]
    fn test_unit_parsing_and_display() {
        assert_eq!(GlucoseUnit::from_setting("mmol"), GlucoseUnit::MmolL);
        assert_eq!(GlucoseUnit::from_setting("MMOL/L"), GlucoseUnit::MmolL);
        assert_eq!(GlucoseUnit::from_setting("mg/dl"), GlucoseUnit::MgDl);

        assert_eq!(GlucoseUnit::MgDl.display(154.0), 154.0);
        assert_eq!(GlucoseUnit::MmolL.display(180.0), 10.0);
        assert_eq!(GlucoseUnit::MmolL.display(70.0), 3.9);
        assert_eq!(GlucoseUnit::MmolL.label(), "mmol/L");
    }

    #[test]
    fn test_partial_thresholds_fill_defaults() {
        let status = ServerStatus {
            settings: ServerSettings {
                units: Some("mmol".into()),
                thresholds: Some(ServerThresholds {
                    bg_low: Some(54.0),
                    bg_target_top: Some(160.0),
                    ..Default::default()
                }),
            },
        };
        let ctx = AnalysisContext::from_status(&status);
        assert_eq!(ctx.unit, GlucoseUnit::MmolL);
        assert_eq!(ctx.thresholds.urgent_low, 54);
        assert_eq!(ctx.thresholds.target_low, 70);
        assert_eq!(ctx.thresholds.target_high, 160);
        assert_eq!(ctx.thresholds.urgent_high, 250);
    }

    #[tokio::test]
    async fn test_resolver_falls_back_silently() {
        let source = StatusSource(None);
        let ctx = ThresholdsResolver::new(&source).resolve().await;
        assert_eq!(ctx, AnalysisContext::default());
    }

    #[tokio::test]
    async fn test_resolver_reads_status() {
        let source = StatusSource(Some(ServerStatus {
            settings: ServerSettings {
                units: Some("mg/dl".into()),
                thresholds: Some(ServerThresholds {
                    bg_low: Some(60.0),
                    bg_target_bottom: Some(80.0),
                    bg_target_top: Some(170.0),
                    bg_high: Some(240.0),
                }),
            },
        }));
        let ctx = ThresholdsResolver::new(&source).resolve().await;
        assert_eq!(ctx.thresholds, Thresholds { urgent_low: 60, target_low: 80, target_high: 170, urgent_high: 240 });
        assert_eq!(ctx.unit, GlucoseUnit::MgDl);
    }
}
