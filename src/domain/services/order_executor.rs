//! Execution coordinator - turns an execution key into at most one broker order
//!
//! The execution row is created atomically before the broker is called. A key
//! that already has a row is never sent to the broker again, whatever state
//! that row is in, so restarts and duplicate evaluations cannot double-submit.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::entities::execution::{
    ExecKey, ExecutionRecord, ExecutionStatus, ExecutionUpdate, OrderEventKind, OrderSpec,
    OrderUpdate,
};
use crate::domain::repositories::broker_adapter::{BrokerAdapter, PlaceOrderRequest};
use crate::domain::repositories::store::ExecutionStore;
use crate::domain::services::trade_execution_error::ExecutionError;

/// Coordinates idempotent order placement and order lifecycle updates
pub struct ExecutionCoordinator {
    store: Arc<dyn ExecutionStore>,
    broker: Arc<dyn BrokerAdapter>,
}

impl ExecutionCoordinator {
    pub fn new(store: Arc<dyn ExecutionStore>, broker: Arc<dyn BrokerAdapter>) -> Self {
        Self { store, broker }
    }

    pub fn broker_name(&self) -> &str {
        self.broker.name()
    }

    /// Execute `spec` under `exec_key`
    ///
    /// Returns the stored row. An existing row is returned unchanged without
    /// contacting the broker.
    pub async fn execute(
        &self,
        exec_key: &ExecKey,
        spec: &OrderSpec,
    ) -> Result<ExecutionRecord, ExecutionError> {
        self.execute_tracked(exec_key, spec)
            .await
            .map(|(record, _)| record)
    }

    /// Same as [`execute`](Self::execute), also reporting whether this call created the row
    pub async fn execute_tracked(
        &self,
        exec_key: &ExecKey,
        spec: &OrderSpec,
    ) -> Result<(ExecutionRecord, bool), ExecutionError> {
        let (record, created) = self.store.create_execution_if_absent(exec_key, spec).await?;
        if !created {
            info!(
                "Execution {} already exists in {}, not resubmitting",
                exec_key, record.status
            );
            return Ok((record, false));
        }

        let request = PlaceOrderRequest {
            contract_id: spec.contract_id.clone(),
            side: spec.side,
            qty: spec.qty,
            order_type: spec.entry_type,
            custom_tag: exec_key.as_str().to_string(),
        };

        info!(
            "Submitting {} {} x{} on {} via {} ({})",
            request.order_type,
            request.side.entry_action(),
            request.qty,
            request.contract_id,
            self.broker.name(),
            exec_key
        );

        match self.broker.place_order(&request).await {
            Ok(ack) => {
                info!("Execution {} submitted as order {}", exec_key, ack.order_id);
                let update = ExecutionUpdate::submitted(ack.order_id.clone());
                let mut submitted = record;

                // the order is live at the broker from here on, whatever the store says
                match self
                    .store
                    .update_execution(submitted.id, ExecutionStatus::IntentCreated, &update)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        "Execution {} left INTENT_CREATED before submission was recorded",
                        exec_key
                    ),
                    Err(store_error) => {
                        error!(
                            "Order {} for execution {} is live but was not recorded: {}",
                            ack.order_id, exec_key, store_error
                        );
                        submitted.status = ExecutionStatus::OrderSubmitted;
                        submitted.entry_order_id = Some(ack.order_id);
                        return Ok((submitted, true));
                    }
                }

                submitted.status = ExecutionStatus::OrderSubmitted;
                submitted.entry_order_id = Some(ack.order_id);
                match self.store.find_execution_by_key(exec_key).await {
                    Ok(Some(stored)) => Ok((stored, true)),
                    Ok(None) => Ok((submitted, true)),
                    Err(store_error) => {
                        warn!("Could not reload execution {}: {}", exec_key, store_error);
                        Ok((submitted, true))
                    }
                }
            }
            Err(broker_error) => {
                error!("Execution {} failed: {}", exec_key, broker_error);
                let update = ExecutionUpdate::failed(broker_error.to_string());
                if let Err(store_error) = self
                    .store
                    .update_execution(record.id, ExecutionStatus::IntentCreated, &update)
                    .await
                {
                    error!(
                        "Could not record failure of execution {}: {}",
                        exec_key, store_error
                    );
                }
                Err(ExecutionError::Broker {
                    exec_key: exec_key.clone(),
                    source: broker_error,
                })
            }
        }
    }

    /// Advance an execution from a broker order event
    ///
    /// Returns the updated row, or `None` when the event matched no row, was a
    /// repeat, or describes an illegal transition.
    pub async fn apply_order_update(
        &self,
        update: &OrderUpdate,
    ) -> Result<Option<ExecutionRecord>, ExecutionError> {
        let Some(record) = self.resolve(update).await? else {
            warn!(
                "Order update for unknown execution (tag {:?}, order {:?})",
                update.custom_tag, update.order_id
            );
            return Ok(None);
        };

        let target = update.kind.target_status();
        if record.status == target {
            debug!("Execution {} already {}", record.exec_key, target);
            return Ok(None);
        }
        if !record.status.can_transition_to(target) {
            warn!(
                "Ignoring illegal transition {} -> {} for execution {}",
                record.status, target, record.exec_key
            );
            return Ok(None);
        }

        let mut change = ExecutionUpdate::status(target);
        if record.entry_order_id.is_none() {
            change.entry_order_id = update.order_id.clone();
        }
        if let OrderEventKind::Rejected { reason } = &update.kind {
            change.error = Some(reason.clone());
        }

        let applied = self
            .store
            .update_execution(record.id, record.status, &change)
            .await?;
        if !applied {
            debug!(
                "Execution {} changed concurrently, update to {} skipped",
                record.exec_key, target
            );
            return Ok(None);
        }

        info!(
            "Execution {}: {} -> {}",
            record.exec_key, record.status, target
        );
        Ok(self.store.find_execution_by_key(&record.exec_key).await?)
    }

    async fn resolve(&self, update: &OrderUpdate) -> Result<Option<ExecutionRecord>, ExecutionError> {
        if let Some(tag) = &update.custom_tag {
            let key = ExecKey::from(tag.as_str());
            if let Some(record) = self.store.find_execution_by_key(&key).await? {
                return Ok(Some(record));
            }
        }
        match &update.order_id {
            Some(order_id) => Ok(self.store.find_execution_by_order_id(order_id).await?),
            None => Ok(None),
        }
    }
}
