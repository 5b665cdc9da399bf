//! Multi-signal fraud risk scoring.
//!
//! The scorer is the state-free orchestrator invoked once per activity
//! event. It runs five independent detectors (location, time, device,
//! behavior, pattern), aggregates their flags into a confidence-weighted
//! 0-100 score, maps the score to a risk level, and emits recommendations
//! and auto-actions. The full result lands in a bounded audit log.
//!
//! RULE: the scorer never blocks a business action. An internal failure
//! degrades to a Low-risk, zero-flag result; the host still decides.

use crate::{
    config::{DetectionConfig, EngineConfig, ScoringConfig},
    error::EngineResult,
    fingerprint::DeviceCheck,
    location::{LocationHistory, LocationPoint, MovementEvidence},
    sensor::MovementSummary,
    store::TelemetryStore,
    tracker,
    types::{AgentId, Severity},
};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Fixed scoring constants ──────────────────────────────────────────────────
// These are contractual, not tunable: hosts compare risk levels across app
// versions, so the mapping must never drift.

const WEIGHT_LOW: f64 = 10.0;
const WEIGHT_MEDIUM: f64 = 25.0;
const WEIGHT_HIGH: f64 = 50.0;
const WEIGHT_CRITICAL: f64 = 100.0;

const MEDIUM_SCORE: f64 = 30.0;
const HIGH_SCORE: f64 = 60.0;
const CRITICAL_SCORE: f64 = 80.0;

/// How long activity rows are kept for the velocity and similarity windows.
const ACTIVITY_RETENTION_HOURS: i64 = 24;

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Low => WEIGHT_LOW,
        Severity::Medium => WEIGHT_MEDIUM,
        Severity::High => WEIGHT_HIGH,
        Severity::Critical => WEIGHT_CRITICAL,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Pure, monotonic score-to-level mapping with boundaries at 30/60/80.
    pub fn for_score(score: f64) -> Self {
        if score >= CRITICAL_SCORE {
            Self::Critical
        } else if score >= HIGH_SCORE {
            Self::High
        } else if score >= MEDIUM_SCORE {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Field activities subject to a fraud check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    VisitStart,
    VisitEnd,
    PhotoCapture,
    Sale,
    Survey,
}

impl ActivityKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::VisitStart => "visit_start",
            Self::VisitEnd => "visit_end",
            Self::PhotoCapture => "photo_capture",
            Self::Sale => "sale",
            Self::Survey => "survey",
        }
    }
}

/// Which detector produced a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Location,
    Time,
    Device,
    Behavior,
    Pattern,
}

/// Concrete evidence behind a flag, one shape per check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlagEvidence {
    Movement(MovementEvidence),
    Accuracy {
        accuracy_m: f64,
    },
    OutsideHours {
        hour: u32,
        start_hour: u32,
        end_hour: u32,
    },
    Weekend {
        weekday: u32,
    },
    DeviceSwap {
        previous_id: String,
        current_id: String,
    },
    Tamper {
        reasons: Vec<String>,
    },
    Stationary {
        average_magnitude: f64,
    },
    ActivityBurst {
        count: u32,
        window_min: i64,
    },
    RepeatedActivity {
        count: u32,
        window_min: i64,
    },
}

/// One piece of fraud evidence. Produced fresh per check, never persisted
/// individually, only inside the aggregate result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudFlag {
    pub kind: FlagKind,
    pub severity: Severity,
    pub description: String,
    pub evidence: FlagEvidence,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
}

/// Activity event handed in by the host before committing the action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudCheckInput {
    pub agent_id: AgentId,
    pub activity: ActivityKind,
    pub location: Option<LocationPoint>,
    pub timestamp: DateTime<Utc>,
    /// Host-supplied trail, consulted when the tracker has no history.
    #[serde(default)]
    pub previous_locations: Vec<LocationPoint>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Evidence gathered from the other components for one check.
#[derive(Default)]
pub struct CheckContext<'a> {
    pub movement: Option<MovementSummary>,
    pub device: Option<&'a DeviceCheck>,
    pub history: Option<&'a LocationHistory>,
}

impl CheckContext<'_> {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The verdict. One per evaluated activity event; append-only audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudCheckResult {
    pub check_id: Uuid,
    pub agent_id: AgentId,
    pub activity: ActivityKind,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub flags: Vec<FraudFlag>,
    pub reason: String,
    pub recommendations: Vec<String>,
    pub auto_actions: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// Confidence-weighted average severity, scaled to [0, 100].
/// Zero flags score zero.
pub fn aggregate_score(flags: &[FraudFlag]) -> f64 {
    if flags.is_empty() {
        return 0.0;
    }
    let weighted: f64 = flags
        .iter()
        .map(|f| severity_weight(f.severity) * f.confidence.clamp(0.0, 1.0))
        .sum();
    let total: f64 = flags.iter().map(|f| severity_weight(f.severity)).sum();
    (100.0 * weighted / total).clamp(0.0, 100.0)
}

pub struct FraudRiskScorer {
    store: TelemetryStore,
    scoring: ScoringConfig,
    detection: DetectionConfig,
}

impl FraudRiskScorer {
    pub fn new(store: TelemetryStore, config: &EngineConfig) -> Self {
        Self {
            store,
            scoring: config.scoring.clone(),
            detection: config.detection.clone(),
        }
    }

    /// Score one activity event. Never fails: an internal error degrades
    /// to a Low-risk, zero-flag verdict so the business action is never
    /// blocked by the engine's own fault.
    pub fn check(&self, input: &FraudCheckInput, ctx: &CheckContext) -> FraudCheckResult {
        let result = match self.evaluate(input, ctx) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("fraud check degraded for {}: {e}", input.agent_id);
                self.degraded_result(input)
            }
        };

        // Bookkeeping failures are logged, never surfaced: the verdict is
        // already made.
        if let Err(e) = self
            .store
            .append_fraud_result(&result, self.scoring.audit_log_capacity)
        {
            log::warn!("failed to append fraud audit entry: {e}");
        }
        if let Err(e) = self.store.record_activity(
            &input.agent_id,
            input.activity,
            input.metadata.as_ref(),
            input.timestamp,
        ) {
            log::warn!("failed to record activity: {e}");
        }
        let cutoff = input.timestamp - Duration::hours(ACTIVITY_RETENTION_HOURS);
        if let Err(e) = self.store.prune_activities_before(cutoff) {
            log::warn!("failed to prune activity log: {e}");
        }

        result
    }

    /// Recent verdicts from the bounded audit log, newest last.
    pub fn fraud_history(&self, limit: usize) -> EngineResult<Vec<FraudCheckResult>> {
        self.store.fraud_history(limit)
    }

    fn evaluate(
        &self,
        input: &FraudCheckInput,
        ctx: &CheckContext,
    ) -> EngineResult<FraudCheckResult> {
        let pattern = self.store.behavior_pattern(&input.agent_id)?;

        let mut flags = Vec::new();
        flags.extend(self.location_flags(input, ctx));
        flags.extend(self.time_flags(input, pattern.as_ref()));
        flags.extend(self.device_flags(ctx));
        flags.extend(self.behavior_flags(input, ctx)?);
        flags.extend(self.pattern_flags(input)?);

        let risk_score = aggregate_score(&flags);
        let risk_level = RiskLevel::for_score(risk_score);

        Ok(FraudCheckResult {
            check_id: Uuid::new_v4(),
            agent_id: input.agent_id.clone(),
            activity: input.activity,
            risk_level,
            risk_score,
            reason: reason_for(&flags),
            recommendations: recommendations_for(risk_level, &flags),
            auto_actions: auto_actions_for(risk_level),
            flags,
            checked_at: input.timestamp,
        })
    }

    fn degraded_result(&self, input: &FraudCheckInput) -> FraudCheckResult {
        FraudCheckResult {
            check_id: Uuid::new_v4(),
            agent_id: input.agent_id.clone(),
            activity: input.activity,
            risk_level: RiskLevel::Low,
            risk_score: 0.0,
            flags: Vec::new(),
            reason: "Fraud detection system error: manual review recommended".to_string(),
            recommendations: vec!["Manually review this activity".to_string()],
            auto_actions: vec!["log_incident".to_string()],
            checked_at: input.timestamp,
        }
    }

    // ── Detectors ──────────────────────────────────────────────

    fn location_flags(&self, input: &FraudCheckInput, ctx: &CheckContext) -> Vec<FraudFlag> {
        let location = match &input.location {
            Some(l) => l,
            None => return Vec::new(),
        };
        let mut flags = Vec::new();

        if location.accuracy_m > self.scoring.poor_accuracy_m {
            flags.push(FraudFlag {
                kind: FlagKind::Location,
                severity: Severity::Medium,
                description: format!("GPS accuracy is poor ({:.0} m)", location.accuracy_m),
                evidence: FlagEvidence::Accuracy {
                    accuracy_m: location.accuracy_m,
                },
                confidence: 0.6,
            });
        }
        if location.accuracy_m < self.detection.spoof_accuracy_floor_m {
            flags.push(FraudFlag {
                kind: FlagKind::Location,
                severity: Severity::High,
                description: format!(
                    "GPS accuracy {:.2} m is unrealistically precise, spoofing suspected",
                    location.accuracy_m
                ),
                evidence: FlagEvidence::Accuracy {
                    accuracy_m: location.accuracy_m,
                },
                confidence: 0.85,
            });
        }

        // Movement physics against the preceding fix. The tracker's own
        // history wins; the host-supplied trail is the fallback.
        let (prev, occurrences) = match ctx.history {
            Some(history) if !history.is_empty() => (
                history.latest().copied(),
                history.identical_count(location.latitude, location.longitude) + 1,
            ),
            _ => (
                input.previous_locations.last().copied(),
                input
                    .previous_locations
                    .iter()
                    .filter(|p| {
                        p.latitude == location.latitude && p.longitude == location.longitude
                    })
                    .count()
                    + 1,
            ),
        };
        for finding in tracker::detect_movement_anomalies(
            prev.as_ref(),
            location,
            occurrences,
            &self.detection,
        ) {
            flags.push(FraudFlag {
                kind: FlagKind::Location,
                severity: finding.severity,
                description: finding.description,
                evidence: FlagEvidence::Movement(finding.evidence),
                confidence: finding.confidence,
            });
        }

        flags
    }

    fn time_flags(
        &self,
        input: &FraudCheckInput,
        pattern: Option<&crate::behavior::BehaviorPattern>,
    ) -> Vec<FraudFlag> {
        let mut flags = Vec::new();
        let hour = input.timestamp.hour();
        let unusual_hour = hour < self.scoring.early_hour || hour > self.scoring.late_hour;

        match pattern {
            Some(p) if !p.typical_working_hours.contains(hour) => {
                let wh = p.typical_working_hours;
                let (severity, confidence) = if unusual_hour {
                    (Severity::High, 0.8)
                } else {
                    (Severity::Medium, 0.65)
                };
                flags.push(FraudFlag {
                    kind: FlagKind::Time,
                    severity,
                    description: format!(
                        "Activity at {hour:02}:00 outside typical working hours {}:00-{}:00",
                        wh.start_hour, wh.end_hour
                    ),
                    evidence: FlagEvidence::OutsideHours {
                        hour,
                        start_hour: wh.start_hour,
                        end_hour: wh.end_hour,
                    },
                    confidence,
                });
            }
            // No baseline: only the hard unusual-hour bounds apply, so a
            // missing pattern alone never flags.
            None if unusual_hour => {
                flags.push(FraudFlag {
                    kind: FlagKind::Time,
                    severity: Severity::High,
                    description: format!("Activity at {hour:02}:00 is at an unusual hour"),
                    evidence: FlagEvidence::OutsideHours {
                        hour,
                        start_hour: self.scoring.early_hour,
                        end_hour: self.scoring.late_hour,
                    },
                    confidence: 0.8,
                });
            }
            _ => {}
        }

        // Day 0 = Sunday, 6 = Saturday.
        let weekday = input.timestamp.weekday().num_days_from_sunday();
        if weekday == 0 || weekday == 6 {
            flags.push(FraudFlag {
                kind: FlagKind::Time,
                severity: Severity::Medium,
                description: "Activity on a weekend".to_string(),
                evidence: FlagEvidence::Weekend { weekday },
                confidence: 0.6,
            });
        }

        flags
    }

    fn device_flags(&self, ctx: &CheckContext) -> Vec<FraudFlag> {
        let check = match ctx.device {
            Some(c) => c,
            None => return Vec::new(),
        };
        let mut flags = Vec::new();

        if check.identity_changed {
            flags.push(FraudFlag {
                kind: FlagKind::Device,
                severity: Severity::Critical,
                description: format!(
                    "Device identity changed from {} to {}",
                    check.previous_device_id.as_deref().unwrap_or("unknown"),
                    check.fingerprint.device_id
                ),
                evidence: FlagEvidence::DeviceSwap {
                    previous_id: check
                        .previous_device_id
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                    current_id: check.fingerprint.device_id.clone(),
                },
                confidence: 0.9,
            });
        }
        if check.tamper_suspected {
            flags.push(FraudFlag {
                kind: FlagKind::Device,
                severity: Severity::High,
                description: format!(
                    "Device integrity suspect: {}",
                    check.tamper_reasons.join(", ")
                ),
                evidence: FlagEvidence::Tamper {
                    reasons: check.tamper_reasons.clone(),
                },
                confidence: 0.8,
            });
        }

        flags
    }

    fn behavior_flags(
        &self,
        input: &FraudCheckInput,
        ctx: &CheckContext,
    ) -> EngineResult<Vec<FraudFlag>> {
        let mut flags = Vec::new();

        if input.activity == ActivityKind::VisitStart {
            if let Some(summary) = &ctx.movement {
                if summary.is_stationary {
                    flags.push(FraudFlag {
                        kind: FlagKind::Behavior,
                        severity: Severity::Medium,
                        description:
                            "Device was stationary before the visit started, no physical approach detected"
                                .to_string(),
                        evidence: FlagEvidence::Stationary {
                            average_magnitude: summary.average_magnitude,
                        },
                        confidence: 0.65,
                    });
                }
            }
        }

        let window = Duration::minutes(self.scoring.velocity_window_min);
        let count = self.store.count_agent_activities_in_window(
            &input.agent_id,
            input.timestamp - window,
            input.timestamp,
        )?;
        if count > self.scoring.velocity_threshold {
            flags.push(FraudFlag {
                kind: FlagKind::Behavior,
                severity: Severity::High,
                description: format!(
                    "{count} activities in the last {} minutes",
                    self.scoring.velocity_window_min
                ),
                evidence: FlagEvidence::ActivityBurst {
                    count,
                    window_min: self.scoring.velocity_window_min,
                },
                confidence: 0.85,
            });
        }

        Ok(flags)
    }

    fn pattern_flags(&self, input: &FraudCheckInput) -> EngineResult<Vec<FraudFlag>> {
        let window = Duration::minutes(self.scoring.similarity_window_min);
        let count = self.store.count_similar_activities(
            &input.agent_id,
            input.activity,
            input.metadata.as_ref(),
            input.timestamp - window,
            input.timestamp,
        )?;
        if count > self.scoring.similarity_threshold {
            return Ok(vec![FraudFlag {
                kind: FlagKind::Pattern,
                severity: Severity::Medium,
                description: format!(
                    "{count} near-identical {} submissions in {} minutes",
                    input.activity.label(),
                    self.scoring.similarity_window_min
                ),
                evidence: FlagEvidence::RepeatedActivity {
                    count,
                    window_min: self.scoring.similarity_window_min,
                },
                confidence: 0.7,
            }]);
        }
        Ok(Vec::new())
    }
}

/// Human-readable verdict summary: critical descriptions win, then high,
/// then a generic count.
fn reason_for(flags: &[FraudFlag]) -> String {
    let at = |severity: Severity| -> Vec<&str> {
        flags
            .iter()
            .filter(|f| f.severity == severity)
            .map(|f| f.description.as_str())
            .collect()
    };

    let criticals = at(Severity::Critical);
    if !criticals.is_empty() {
        return criticals.join("; ");
    }
    let highs = at(Severity::High);
    if !highs.is_empty() {
        return highs.join("; ");
    }
    if !flags.is_empty() {
        return format!("{} potential fraud indicator(s) detected", flags.len());
    }
    "No fraud indicators detected".to_string()
}

fn recommendations_for(level: RiskLevel, flags: &[FraudFlag]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: &str| {
        if !out.iter().any(|existing| existing == s) {
            out.push(s.to_string());
        }
    };

    if level == RiskLevel::Critical {
        push("Notify a supervisor immediately");
        push("Consider suspending the agent's access pending review");
    }
    for flag in flags {
        push(match flag.kind {
            FlagKind::Location => "Verify the agent's physical presence at the reported location",
            FlagKind::Time => "Confirm the activity schedule with the agent's supervisor",
            FlagKind::Device => "Re-verify and re-register the agent's device",
            FlagKind::Behavior => "Review the agent's recent activity timeline",
            FlagKind::Pattern => "Audit recent submissions for duplicated content",
        });
    }
    out
}

fn auto_actions_for(level: RiskLevel) -> Vec<String> {
    let mut actions = vec!["log_incident".to_string()];
    match level {
        RiskLevel::Critical => {
            actions.push("alert_supervisor".to_string());
            actions.push("require_additional_verification".to_string());
        }
        RiskLevel::High => {
            actions.push("alert_supervisor".to_string());
            actions.push("increase_monitoring".to_string());
        }
        RiskLevel::Medium => {
            actions.push("increase_monitoring".to_string());
        }
        RiskLevel::Low => {}
    }
    actions
}
