//! Replay newline-delimited events through the orchestrator and report each task.
//!
//! Input lines look like
//! `{"eventType": "INVOICE_COMPLETED", "payload": {"invoice_id": "INV1", "cod_amount": 100}}`
//! (`event_type` is accepted too). Output is one JSON object per generated task.
//!
//! Events are published on an in-memory bus and consumed by the orchestrator's
//! subscriber workers, one at a time: the next line is only published once the
//! previous event's reports are back, so output follows input order.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use taskforge_distribution::{AssignmentState, WorkloadSnapshot};
use taskforge_events::{DomainEvent, EventBus, EventType, InMemoryEventBus};
use taskforge_infra::{DistributionOrchestrator, ProcessedEvent, TaskReport};

#[derive(Debug, Serialize)]
struct ReportLine<'a> {
    line: usize,
    event_type: &'a EventType,
    #[serde(flatten)]
    report: &'a TaskReport,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub events: usize,
    /// Lines that were not valid events.
    pub rejected_lines: usize,
    pub tasks: usize,
    pub auto_assigned: usize,
    pub pending_approval: usize,
    pub unassigned: usize,
    pub submit_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workloads: Option<WorkloadSnapshot>,
}

impl ReplaySummary {
    fn count(&mut self, report: &TaskReport) {
        self.tasks += 1;
        match report.state() {
            AssignmentState::AutoAssigned => self.auto_assigned += 1,
            AssignmentState::PendingApproval => self.pending_approval += 1,
            AssignmentState::Unassigned => self.unassigned += 1,
            AssignmentState::Generated | AssignmentState::Scored => {}
        }
        if report.submit_error.is_some() {
            self.submit_failures += 1;
        }
    }
}

/// Process every line of `input` in order. Blank lines are skipped; lines that do
/// not parse are logged and counted, and replay continues.
pub async fn replay<R, W>(
    orchestrator: &Arc<DistributionOrchestrator>,
    input: R,
    output: &mut W,
) -> anyhow::Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let bus = InMemoryEventBus::new();
    let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
    let workers = orchestrator.start_reporting(&bus, reports_tx);

    let replayed = replay_lines(&bus, &mut reports_rx, input, output).await;

    for worker in workers {
        worker.shutdown().await;
    }
    replayed
}

async fn replay_lines<R, W>(
    bus: &InMemoryEventBus<DomainEvent>,
    reports_rx: &mut mpsc::UnboundedReceiver<ProcessedEvent>,
    input: R,
    output: &mut W,
) -> anyhow::Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut summary = ReplaySummary::default();
    let mut lines = input.lines();
    let mut number = 0;

    while let Some(line) = lines.next_line().await? {
        number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event: DomainEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                warn!(line = number, error = %err, "skipping line that is not an event");
                summary.rejected_lines += 1;
                continue;
            }
        };
        summary.events += 1;

        // Unknown types have no subscriber, so there is nothing to wait for.
        if !event.event_type.is_known() {
            debug!(line = number, event_type = %event.event_type, "event type outside the vocabulary");
            continue;
        }
        bus.publish(event).context("publishing event")?;
        let processed = reports_rx
            .recv()
            .await
            .context("distribution workers stopped before reporting")?;

        for report in &processed.reports {
            summary.count(report);
            let line = ReportLine {
                line: number,
                event_type: &processed.event.event_type,
                report,
            };
            serde_json::to_writer(&mut *output, &line)?;
            writeln!(output)?;
        }
    }

    output.flush()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value as JsonValue;
    use taskforge_infra::RuntimeConfig;

    use crate::roster::Roster;
    use crate::services::in_memory_services;

    #[tokio::test]
    async fn replays_events_and_counts_outcomes() {
        let services = in_memory_services(&RuntimeConfig::default());
        services.apply_roster(&Roster::anonymous(2));

        let input = concat!(
            r#"{"eventType": "INVOICE_COMPLETED", "payload": {"invoice_id": "INV1", "cod_amount": 100}}"#,
            "\n\n",
            "not json\n",
            r#"{"event_type": "payroll_run", "payload": {}}"#,
            "\n",
            r#"{"eventType": "STOCK_LOW", "payload": {"product_id": "P9"}}"#,
            "\n",
        );
        let mut out = Vec::new();

        let summary = replay(&services.orchestrator, input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(summary.events, 3);
        assert_eq!(summary.rejected_lines, 1);
        assert_eq!(summary.tasks, 3);
        assert_eq!(summary.auto_assigned, 1);
        assert_eq!(summary.pending_approval, 2);
        assert_eq!(summary.unassigned, 0);
        assert_eq!(summary.submit_failures, 0);

        let lines: Vec<JsonValue> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["line"], 1);
        assert_eq!(lines[0]["event_type"], "INVOICE_COMPLETED");
        assert_eq!(lines[0]["outcome"]["state"], "auto_assigned");
        assert_eq!(lines[1]["outcome"]["state"], "pending_approval");
        assert_eq!(lines[2]["line"], 5);
        assert_eq!(lines[2]["definition"]["task_kind"], "stock_order");
    }

    #[tokio::test]
    async fn empty_roster_reports_unassigned_work() {
        let services = in_memory_services(&RuntimeConfig::default());
        let input = r#"{"eventType": "WARRANTY_CLAIM", "payload": {"claim_id": "W1"}}"#;
        let mut out = Vec::new();

        let summary = replay(&services.orchestrator, input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(summary.tasks, 2);
        assert_eq!(summary.unassigned, 2);
        assert_eq!(services.board.unassigned().len(), 2);
    }

    #[tokio::test]
    async fn output_follows_input_order_across_event_types() {
        let services = in_memory_services(&RuntimeConfig::default());
        services.apply_roster(&Roster::anonymous(1));
        let input = concat!(
            r#"{"eventType": "STOCK_LOW", "payload": {"product_id": "P1"}}"#,
            "\n",
            r#"{"eventType": "DAILY_TASKS", "payload": {"kind": "cleaning"}}"#,
            "\n",
            r#"{"eventType": "STOCK_LOW", "payload": {"product_id": "P2"}}"#,
            "\n",
        );
        let mut out = Vec::new();

        let summary = replay(&services.orchestrator, input.as_bytes(), &mut out).await.unwrap();

        assert_eq!(summary.tasks, 3);
        let lines: Vec<JsonValue> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let order: Vec<(u64, &str)> = lines
            .iter()
            .map(|l| (l["line"].as_u64().unwrap(), l["event_type"].as_str().unwrap()))
            .collect();
        assert_eq!(order, vec![(1, "STOCK_LOW"), (2, "DAILY_TASKS"), (3, "STOCK_LOW")]);
        assert_eq!(lines[2]["definition"]["source_reference"]["product_id"], "P2");
    }
}
