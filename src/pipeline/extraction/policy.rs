//! Capture quality → provider tier.
//!
//! Each sub-score incurs an independent penalty; the overall score is
//! `100 - Σ penalties`, floored at 0. Poor captures go to the most accurate
//! provider, good captures to the cheapest one. The thresholds only trade
//! cost against accuracy; no correctness depends on them.

use serde::{Deserialize, Serialize};

use super::quality::QualityMeasurements;
use super::ProviderId;
use crate::config::ProviderTiers;

/// Penalty at or above which a hint is tagged high priority.
pub const HIGH_PRIORITY_PENALTY: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBucket {
    /// 80-100
    Good,
    /// 50-79
    Acceptable,
    /// 0-49
    Poor,
}

impl QualityBucket {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Self::Good,
            50..=79 => Self::Acceptable,
            _ => Self::Poor,
        }
    }
}

/// Sub-score that incurred a penalty. Brightness is split by direction
/// so the hint can say which way to correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFactor {
    Blur,
    Darkness,
    Overexposure,
    Resolution,
    Contrast,
    Glare,
    Edges,
    Skew,
}

impl QualityFactor {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Blur => "hold the camera steady and refocus",
            Self::Darkness => "add more light",
            Self::Overexposure => "reduce lighting or exposure",
            Self::Resolution => "move closer",
            Self::Contrast => "place the document on a plain, contrasting surface",
            Self::Glare => "reduce glare",
            Self::Edges => "fit all four document edges in the frame",
            Self::Skew => "align the document with the frame",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Penalty {
    pub factor: QualityFactor,
    pub points: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintPriority {
    High,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationHint {
    pub factor: QualityFactor,
    pub message: String,
    pub penalty: u8,
    pub priority: HintPriority,
}

/// Assessed capture quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub score: u8,
    pub bucket: QualityBucket,
    #[serde(default)]
    pub penalties: Vec<Penalty>,
    /// Ordered by penalty, largest first.
    #[serde(default)]
    pub hints: Vec<RemediationHint>,
    /// Provider proposed by whoever produced the report.
    #[serde(default)]
    pub suggested_provider: Option<ProviderId>,
}

impl QualityReport {
    /// Report received from outside (e.g. the capture device), carrying only
    /// a score. Fractions round down, so borderline captures land in the
    /// more accurate tier.
    pub fn from_score(score: f64) -> Self {
        let score = score.clamp(0.0, 100.0).floor() as u8;
        Self {
            score,
            bucket: QualityBucket::from_score(score),
            penalties: Vec::new(),
            hints: Vec::new(),
            suggested_provider: None,
        }
    }

    pub fn with_suggested_provider(mut self, provider: ProviderId) -> Self {
        self.suggested_provider = Some(provider);
        self
    }

    pub fn has_high_priority_hint(&self) -> bool {
        self.hints.iter().any(|h| h.priority == HintPriority::High)
    }
}

/// Penalty points for one set of measurements, in factor order.
pub fn penalties(m: &QualityMeasurements) -> Vec<Penalty> {
    let mut out = Vec::new();
    let mut add = |factor, points: u8| {
        if points > 0 {
            out.push(Penalty { factor, points });
        }
    };

    add(
        QualityFactor::Blur,
        match m.blur_variance {
            v if v < 40.0 => 35,
            v if v < 100.0 => 25,
            v if v < 200.0 => 10,
            _ => 0,
        },
    );
    add(
        QualityFactor::Darkness,
        match m.mean_brightness {
            b if b < 50.0 => 30,
            b if b < 80.0 => 12,
            _ => 0,
        },
    );
    add(
        QualityFactor::Overexposure,
        match m.mean_brightness {
            b if b > 235.0 => 25,
            b if b > 215.0 => 10,
            _ => 0,
        },
    );
    add(
        QualityFactor::Resolution,
        match m.short_side_px {
            0..=479 => 30,
            480..=719 => 15,
            720..=999 => 5,
            _ => 0,
        },
    );
    add(
        QualityFactor::Contrast,
        match m.contrast_rms {
            c if c < 20.0 => 25,
            c if c < 35.0 => 10,
            _ => 0,
        },
    );
    add(
        QualityFactor::Glare,
        match m.glare_ratio {
            g if g > 0.10 => 25,
            g if g > 0.04 => 12,
            g if g > 0.01 => 5,
            _ => 0,
        },
    );
    add(
        QualityFactor::Edges,
        match m.edges_visible {
            0 | 1 => 20,
            2 => 12,
            3 => 5,
            _ => 0,
        },
    );
    add(
        QualityFactor::Skew,
        match m.skew_degrees.abs() {
            s if s >= 5.0 => 15,
            s if s >= 2.0 => 6,
            _ => 0,
        },
    );
    out
}

/// Maps quality to a provider tier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QualityPolicy {
    tiers: ProviderTiers,
}

impl QualityPolicy {
    pub fn new(tiers: ProviderTiers) -> Self {
        Self { tiers }
    }

    pub fn tiers(&self) -> &ProviderTiers {
        &self.tiers
    }

    /// Score the measurements, attach hints and the selected provider.
    pub fn assess(&self, measurements: &QualityMeasurements) -> QualityReport {
        let penalties = penalties(measurements);
        let total: u32 = penalties.iter().map(|p| p.points as u32).sum();
        let score = 100u32.saturating_sub(total) as u8;

        let mut ranked = penalties.clone();
        // stable: equal penalties keep factor order
        ranked.sort_by(|a, b| b.points.cmp(&a.points));
        let hints = ranked
            .iter()
            .map(|p| RemediationHint {
                factor: p.factor,
                message: p.factor.hint().to_string(),
                penalty: p.points,
                priority: if p.points >= HIGH_PRIORITY_PENALTY {
                    HintPriority::High
                } else {
                    HintPriority::Normal
                },
            })
            .collect();

        let mut report = QualityReport {
            score,
            bucket: QualityBucket::from_score(score),
            penalties,
            hints,
            suggested_provider: None,
        };
        report.suggested_provider = Some(self.select(&report));
        report
    }

    /// Provider for a report, by bucket of its score.
    pub fn select(&self, report: &QualityReport) -> ProviderId {
        match QualityBucket::from_score(report.score) {
            QualityBucket::Poor => self.tiers.accurate.clone(),
            QualityBucket::Acceptable => self.tiers.balanced.clone(),
            QualityBucket::Good => self.tiers.economy.clone(),
        }
    }

    /// Provider when no assessment is available.
    pub fn unassessed(&self) -> ProviderId {
        self.tiers.accurate.clone()
    }
}
