//! Bookkeeping for flows in progress.
//!
//! The hub holds the manager behind a mutex. A handler is checked out with
//! [`FlowManager::checkout`] while a step runs so the lock is never held across
//! an await, and checked back in with [`FlowManager::checkin`] afterwards.

use std::collections::HashMap;

use super::{FlowContext, FlowError, FlowHandler, FlowProgress};
use crate::entries::{generate_id, Source};

const FLOW_ID_LENGTH: usize = 32;

struct FlowRecord {
    handler: String,
    context: FlowContext,
    step_id: Option<String>,
    flow: Option<Box<dyn FlowHandler>>,
}

/// Flows in progress, keyed by flow id.
#[derive(Default)]
pub(crate) struct FlowManager {
    flows: HashMap<String, FlowRecord>,
    order: Vec<String>,
}

impl std::fmt::Debug for FlowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowManager")
            .field("flows", &self.order)
            .finish()
    }
}

impl FlowManager {
    /// Generates an id for a new flow.
    pub fn new_flow_id() -> String {
        generate_id(FLOW_ID_LENGTH)
    }

    /// Returns `true` if a reauth flow for `entry_id` is in progress.
    pub fn reauth_in_progress(&self, domain: &str, entry_id: &str) -> bool {
        self.flows.values().any(|record| {
            record.handler == domain
                && record.context.source == Source::Reauth
                && record.context.entry_id.as_deref() == Some(entry_id)
        })
    }

    /// Registers a new flow. The handler starts checked in.
    pub fn insert(
        &mut self,
        flow_id: String,
        handler: String,
        context: FlowContext,
        flow: Box<dyn FlowHandler>,
    ) {
        self.order.push(flow_id.clone());
        self.flows.insert(
            flow_id,
            FlowRecord {
                handler,
                context,
                step_id: None,
                flow: Some(flow),
            },
        );
    }

    /// Takes the handler of a flow out for one step.
    ///
    /// # Errors
    ///
    /// [`FlowError::UnknownFlow`] if the flow does not exist and
    /// [`FlowError::Busy`] if a step is already running.
    pub fn checkout(
        &mut self,
        flow_id: &str,
    ) -> Result<(Box<dyn FlowHandler>, String, FlowContext), FlowError> {
        let record = self
            .flows
            .get_mut(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow {
                flow_id: flow_id.to_string(),
            })?;

        let flow = record.flow.take().ok_or_else(|| FlowError::Busy {
            flow_id: flow_id.to_string(),
        })?;

        Ok((flow, record.handler.clone(), record.context.clone()))
    }

    /// Returns a handler after a step that left the flow open.
    pub fn checkin(&mut self, flow_id: &str, flow: Box<dyn FlowHandler>, step_id: Option<&str>) {
        if let Some(record) = self.flows.get_mut(flow_id) {
            record.flow = Some(flow);
            if let Some(step_id) = step_id {
                record.step_id = Some(step_id.to_string());
            }
        }
    }

    /// Removes a finished flow.
    pub fn finish(&mut self, flow_id: &str) {
        self.flows.remove(flow_id);
        self.order.retain(|id| id != flow_id);
    }

    /// Removes every flow started for `entry_id`.
    pub fn finish_for_entry(&mut self, entry_id: &str) {
        let ids: Vec<String> = self
            .flows
            .iter()
            .filter(|(_, r)| r.context.entry_id.as_deref() == Some(entry_id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            self.finish(&id);
        }
    }

    /// Lists flows waiting on a step, oldest first.
    pub fn progress(&self) -> Vec<FlowProgress> {
        self.order
            .iter()
            .filter_map(|flow_id| {
                let record = self.flows.get(flow_id)?;
                Some(FlowProgress {
                    flow_id: flow_id.clone(),
                    handler: record.handler.clone(),
                    step_id: record.step_id.clone()?,
                    context: record.context.clone(),
                })
            })
            .collect()
    }
}
