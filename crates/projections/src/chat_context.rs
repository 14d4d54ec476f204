//! Context builder for the assistant chat.
//!
//! Keeps its own copy of the warehouse, renders one text section per
//! dashboard widget and feeds them through a [`ContextBarrier`]. The latest
//! consolidated context is kept until the next cycle completes.

use std::collections::VecDeque;
use std::fmt::Write as _;

use parcelsim_core::{Entity, Timestamp};
use parcelsim_events::{Category, EventEnvelope, Projection, SimEvent, WireEvent};
use parcelsim_simulation::{ParcelStatus, WarehouseState};

use crate::barrier::{ContextBarrier, ContextSnapshot};

pub const SECTION_WORKERS: &str = "workers";
pub const SECTION_PARCELS: &str = "parcels";
pub const SECTION_ALERTS: &str = "alerts";

const MAX_ALERTS: usize = 10;

#[derive(Debug, Clone)]
pub struct ChatContext {
    state: WarehouseState,
    barrier: ContextBarrier,
    alerts: VecDeque<String>,
    last: Option<ContextSnapshot>,
}

impl ChatContext {
    pub fn new(state: WarehouseState) -> Self {
        Self {
            state,
            barrier: ContextBarrier::new([SECTION_WORKERS, SECTION_PARCELS, SECTION_ALERTS]),
            alerts: VecDeque::new(),
            last: None,
        }
    }

    pub fn state(&self) -> &WarehouseState {
        &self.state
    }

    pub fn barrier(&self) -> &ContextBarrier {
        &self.barrier
    }

    pub fn recover_due(&mut self, now: Timestamp) {
        self.state.recover_due(now);
    }

    /// Last consolidated context, if a cycle ever completed.
    pub fn last(&self) -> Option<&ContextSnapshot> {
        self.last.as_ref()
    }

    pub fn context(&self) -> Option<String> {
        self.last.as_ref().map(ContextSnapshot::render)
    }

    /// Start a collection cycle that external widgets report into.
    pub fn begin_cycle(&mut self) {
        self.barrier.begin_cycle();
    }

    pub fn report_section(&mut self, name: &str, text: impl Into<String>) -> Option<&ContextSnapshot> {
        let snapshot = self.barrier.report_section(name, text)?;
        self.last = Some(snapshot);
        self.last.as_ref()
    }

    /// Chat closed: stop collecting.
    pub fn end_cycle(&mut self) {
        self.barrier.end_cycle();
    }

    /// Run a full cycle with every section rendered from local state.
    pub fn refresh(&mut self, now: Timestamp) -> Option<&ContextSnapshot> {
        self.barrier.begin_cycle();
        let sections = [
            (SECTION_WORKERS, self.render_workers(now)),
            (SECTION_PARCELS, self.render_parcels()),
            (SECTION_ALERTS, self.render_alerts()),
        ];
        let mut completed = None;
        for (name, text) in sections {
            if let Some(snapshot) = self.barrier.report_section(name, text) {
                completed = Some(snapshot);
            }
        }
        if let Some(snapshot) = completed {
            self.last = Some(snapshot);
        }
        self.last.as_ref()
    }

    pub fn render_workers(&self, now: Timestamp) -> String {
        let mut out = String::new();
        for w in self.state.workers().iter() {
            let _ = writeln!(
                out,
                "{} {} processed={} accidents={} accidentRate={} utilization={}",
                w.id(),
                w.status(),
                w.processed_count(),
                w.accident_count(),
                w.accident_rate_label(),
                w.utilization_label(now),
            );
        }
        out
    }

    pub fn render_parcels(&self) -> String {
        let parcels = self.state.parcels();
        let mut out = format!("total={}\n", parcels.len());
        for status in ParcelStatus::ALL {
            let (count, value) = parcels
                .with_status(status)
                .fold((0usize, 0.0f64), |(n, sum), p| (n + 1, sum + p.declared_value()));
            let _ = writeln!(out, "{status} count={count} declaredValue={value:.0}");
        }
        out
    }

    pub fn render_alerts(&self) -> String {
        if self.alerts.is_empty() {
            return "no alerts".to_string();
        }
        self.alerts.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    fn record_alert(&mut self, event: &SimEvent) {
        let wire = WireEvent::from(event.clone());
        if wire.category != Category::Alarm {
            return;
        }
        let subject = wire.worker_id.or(wire.waybill_id).unwrap_or_default();
        self.alerts.push_back(format!(
            "{} {} {subject}",
            Timestamp::from_millis(wire.ts),
            wire.msg
        ));
        while self.alerts.len() > MAX_ALERTS {
            self.alerts.pop_front();
        }
    }
}

impl Projection for ChatContext {
    type Ev = SimEvent;

    fn apply(&mut self, envelope: &EventEnvelope<SimEvent>) {
        let event = envelope.payload();
        if self.state.apply(event).is_empty() {
            return;
        }
        if matches!(event, SimEvent::Reset { .. }) {
            self.alerts.clear();
        }
        self.record_alert(event);
    }
}
