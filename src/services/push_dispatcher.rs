/// Push-channel fan-out
///
/// Delivers one notification to all active devices of one user through the
/// push provider, independent of whether that user has a live socket.
/// Per-device failures are isolated and surfaced only as aggregate counts;
/// nothing here aborts a sibling delivery or crashes the caller.
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::directory::DeviceDirectory;
use crate::metrics;
use crate::services::expo_client::{is_valid_push_token, PushMessage, PushProvider, TicketStatus};

/// Outcome of one user-level push dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushOutcome {
    /// Pushes the provider acknowledged (ticket "ok")
    pub success_count: usize,
    /// Devices a delivery was attempted for, malformed tokens included
    pub total_count: usize,
}

#[derive(Clone)]
pub struct PushDispatcher {
    directory: Arc<dyn DeviceDirectory>,
    provider: Option<Arc<dyn PushProvider>>,
    receipt_delay: Duration,
}

impl PushDispatcher {
    pub fn new(directory: Arc<dyn DeviceDirectory>, provider: Option<Arc<dyn PushProvider>>) -> Self {
        Self {
            directory,
            provider,
            receipt_delay: Duration::ZERO,
        }
    }

    /// Enable the best-effort receipt check, run this long after dispatch
    pub fn with_receipt_check(mut self, delay: Duration) -> Self {
        self.receipt_delay = delay;
        self
    }

    /// Deliver to all active devices of one user. A user with zero devices
    /// yields `0/0`, not an error. Token format is validated before the
    /// provider is contacted; malformed tokens count as immediate failures.
    pub async fn dispatch(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> PushOutcome {
        let devices = match self.directory.active_devices(user_id).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(%user_id, error = %e, "device lookup failed, skipping push");
                return PushOutcome::default();
            }
        };

        if devices.is_empty() {
            return PushOutcome::default();
        }

        let total_count = devices.len();
        let (valid, malformed): (Vec<_>, Vec<_>) = devices
            .into_iter()
            .partition(|d| is_valid_push_token(&d.token));

        for device in &malformed {
            debug!(%user_id, device_id = %device.id, "skipping malformed push token");
        }

        let mut success_count = 0;

        if !valid.is_empty() {
            match &self.provider {
                None => warn!(%user_id, "push provider not configured"),
                Some(provider) => {
                    let messages = valid
                        .iter()
                        .map(|d| PushMessage::new(d.token.clone(), title, body, data.clone()))
                        .collect();

                    match provider.send_batch(messages).await {
                        Err(e) => warn!(%user_id, error = %e, "push batch failed"),
                        Ok(tickets) => {
                            let mut ticket_ids = Vec::new();

                            // tickets are positional with the submitted batch
                            for (device, ticket) in valid.iter().zip(tickets.iter()) {
                                if ticket.is_ok() {
                                    success_count += 1;
                                    if let Some(id) = &ticket.id {
                                        ticket_ids.push(id.clone());
                                    }
                                } else {
                                    debug!(
                                        %user_id,
                                        device_id = %device.id,
                                        error = ?ticket.message,
                                        "push rejected by provider"
                                    );
                                    if ticket.is_device_gone() {
                                        if let Err(e) = self
                                            .directory
                                            .mark_token_invalid(device.user_id, &device.token)
                                            .await
                                        {
                                            warn!(%user_id, error = %e, "failed to retire token");
                                        }
                                    }
                                }
                            }

                            self.schedule_receipt_check(provider.clone(), ticket_ids);
                        }
                    }
                }
            }
        }

        metrics::observe_push(success_count, total_count - success_count);
        PushOutcome {
            success_count,
            total_count,
        }
    }

    /// Receipt confirmation is a secondary check: its failure is logged,
    /// never surfaced as a dispatch failure.
    fn schedule_receipt_check(&self, provider: Arc<dyn PushProvider>, ticket_ids: Vec<String>) {
        if ticket_ids.is_empty() || self.receipt_delay.is_zero() {
            return;
        }

        let delay = self.receipt_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match provider.check_receipts(ticket_ids).await {
                Ok(receipts) => {
                    for (id, receipt) in receipts {
                        if receipt.status != TicketStatus::Ok {
                            warn!(ticket = %id, error = ?receipt.message, "push receipt reported failure");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "push receipt check failed"),
            }
        });
    }
}
