use crate::error::{EventError, Result};
use chrono::{DateTime, Utc};
use faultline_common::id;
use serde::{Deserialize, Serialize};

/// 故障处置流程状态机。
///
/// 状态图为前向推进：Detected → Analyzing → Correlated → Processing →
/// Validated → Completed，其中仅保留一条回退边 Validated → Processing
/// （验证未通过时回到处置阶段）。Completed 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub enum ProcessStatus {
    Detected,
    Analyzing,
    Correlated,
    Processing,
    Validated,
    Completed,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessStatus::Detected => "Detected",
            ProcessStatus::Analyzing => "Analyzing",
            ProcessStatus::Correlated => "Correlated",
            ProcessStatus::Processing => "Processing",
            ProcessStatus::Validated => "Validated",
            ProcessStatus::Completed => "Completed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ProcessStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "detected" => Ok(ProcessStatus::Detected),
            "analyzing" => Ok(ProcessStatus::Analyzing),
            "correlated" => Ok(ProcessStatus::Correlated),
            "processing" => Ok(ProcessStatus::Processing),
            "validated" => Ok(ProcessStatus::Validated),
            "completed" => Ok(ProcessStatus::Completed),
            _ => Err(format!("unknown process status: {s}")),
        }
    }
}

/// Transition allow-list. Everything not listed here is rejected.
pub fn allowed_transitions(from: ProcessStatus) -> &'static [ProcessStatus] {
    match from {
        ProcessStatus::Detected => &[ProcessStatus::Analyzing],
        ProcessStatus::Analyzing => &[ProcessStatus::Correlated, ProcessStatus::Processing],
        ProcessStatus::Correlated => &[ProcessStatus::Processing],
        ProcessStatus::Processing => &[ProcessStatus::Validated, ProcessStatus::Completed],
        ProcessStatus::Validated => &[ProcessStatus::Completed, ProcessStatus::Processing],
        ProcessStatus::Completed => &[],
    }
}

pub fn can_transition(from: ProcessStatus, to: ProcessStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// 处置步骤：一个阶段的执行记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProcessStep {
    /// 步骤名称
    pub name: String,
    /// 执行人
    pub assignee: Option<String>,
    /// 开始时间
    pub started_at: Option<DateTime<Utc>>,
    /// 结束时间
    pub ended_at: Option<DateTime<Utc>>,
    /// 是否已完成
    pub completed: bool,
}

/// Phase checklist seeded into every new trace, one step per non-terminal
/// status in graph order.
const STEP_PHASES: [(&str, ProcessStatus); 5] = [
    ("故障检测", ProcessStatus::Detected),
    ("原因分析", ProcessStatus::Analyzing),
    ("关联定位", ProcessStatus::Correlated),
    ("故障处置", ProcessStatus::Processing),
    ("效果验证", ProcessStatus::Validated),
];

fn step_index(status: ProcessStatus) -> Option<usize> {
    STEP_PHASES.iter().position(|(_, s)| *s == status)
}

/// The phase checklist in its initial state: detection already underway,
/// everything else pending.
pub fn default_steps(now: DateTime<Utc>) -> Vec<ProcessStep> {
    STEP_PHASES
        .iter()
        .enumerate()
        .map(|(i, (name, _))| ProcessStep {
            name: name.to_string(),
            assignee: None,
            started_at: if i == 0 { Some(now) } else { None },
            ended_at: None,
            completed: false,
        })
        .collect()
}

/// 故障处置追踪：与事件血缘 1:1 的修复过程审计记录。
///
/// 独立于事件的 firing/resolved 标志存在；事件恢复只会完成当前处置
/// 步骤，不会改变追踪状态。
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProcessTrace {
    /// 追踪 ID
    pub id: String,
    /// 租户 ID
    pub tenant_id: String,
    /// 事件 ID（与事件血缘一一对应）
    pub event_id: String,
    /// 当前状态
    pub status: ProcessStatus,
    /// 处置步骤清单（有序）
    pub steps: Vec<ProcessStep>,
    /// 负责人
    pub assigned_to: Option<String>,
    /// AI 分析结论
    pub ai_analysis: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
    /// 结束时间（到达 Completed 时设置一次，之后不变）
    pub ended_at: Option<DateTime<Utc>>,
}

impl ProcessTrace {
    pub fn new(
        tenant_id: &str,
        event_id: &str,
        assigned_to: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id::next_id(),
            tenant_id: tenant_id.to_string(),
            event_id: event_id.to_string(),
            status: ProcessStatus::Detected,
            steps: default_steps(now),
            assigned_to,
            ai_analysis: None,
            created_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    /// Advance the trace to `to`, checking the allow-list first. A rejected
    /// transition reports both the current and the attempted status and
    /// changes nothing.
    ///
    /// The step for the status being left is closed, the step for the new
    /// status opens with `operator` as its assignee. Re-entering Processing
    /// through the backward edge reopens its step. Reaching Completed closes
    /// every open step and sets the end time exactly once.
    pub fn transition(
        &mut self,
        to: ProcessStatus,
        operator: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !can_transition(self.status, to) {
            return Err(EventError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        if let Some(i) = step_index(self.status) {
            let step = &mut self.steps[i];
            if step.started_at.is_some() && !step.completed {
                step.ended_at = Some(now);
                step.completed = true;
            }
        }

        if to == ProcessStatus::Completed {
            for step in &mut self.steps {
                if step.started_at.is_some() && !step.completed {
                    step.ended_at = Some(now);
                    step.completed = true;
                }
            }
            if self.ended_at.is_none() {
                self.ended_at = Some(now);
            }
        } else if let Some(i) = step_index(to) {
            let step = &mut self.steps[i];
            if step.completed {
                // Backward edge: re-open the phase.
                step.completed = false;
                step.ended_at = None;
            }
            step.started_at = Some(now);
            step.assignee = Some(operator.to_string());
        }

        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Close the earliest still-open step. Called when the underlying event
    /// resolves; returns false when nothing was open.
    pub fn complete_current_step(&mut self, now: DateTime<Utc>) -> bool {
        for step in &mut self.steps {
            if step.started_at.is_some() && !step.completed {
                step.ended_at = Some(now);
                step.completed = true;
                self.updated_at = now;
                return true;
            }
        }
        false
    }

    pub fn attach_analysis(&mut self, analysis: String, now: DateTime<Utc>) {
        self.ai_analysis = Some(analysis);
        self.updated_at = now;
    }
}

/// 处置操作日志：追踪的追加审计项，记录操作前后快照。
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProcessOperationLog {
    /// 日志 ID
    pub id: String,
    /// 租户 ID
    pub tenant_id: String,
    /// 追踪 ID
    pub trace_id: String,
    /// 事件 ID
    pub event_id: String,
    /// 操作人
    pub operator: String,
    /// 操作类型（create / update_status / update_analysis / complete_step）
    pub action: String,
    /// 操作前追踪快照（JSON）
    pub before_snapshot: Option<String>,
    /// 操作后追踪快照（JSON）
    pub after_snapshot: Option<String>,
    /// 描述
    pub description: String,
    /// 操作时间
    pub created_at: DateTime<Utc>,
}

impl ProcessOperationLog {
    /// Snapshot-carrying log entry for one mutation of `after`.
    pub fn record(
        before: Option<&ProcessTrace>,
        after: &ProcessTrace,
        operator: &str,
        action: &str,
        description: String,
    ) -> Self {
        Self {
            id: id::next_id(),
            tenant_id: after.tenant_id.clone(),
            trace_id: after.id.clone(),
            event_id: after.event_id.clone(),
            operator: operator.to_string(),
            action: action.to_string(),
            before_snapshot: before.and_then(|t| serde_json::to_string(t).ok()),
            after_snapshot: serde_json::to_string(after).ok(),
            description,
            created_at: Utc::now(),
        }
    }
}
