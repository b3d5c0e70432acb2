//! Audit records for flow terminal states.

use serde::Serialize;

/// Terminal state of an upstream authorization flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowOutcome {
    Completed,
    Failed,
    Expired,
}

/// What the audited operation was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Authorize,
    Callback,
    Refresh,
    Disconnect,
    OuterCodeIssued,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub user_id: String,
    pub mcp_id: String,
    pub action: AuditAction,
    pub outcome: FlowOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(user_id: &str, mcp_id: &str, action: AuditAction, outcome: FlowOutcome) -> Self {
        Self {
            user_id: user_id.to_string(),
            mcp_id: mcp_id.to_string(),
            action,
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
