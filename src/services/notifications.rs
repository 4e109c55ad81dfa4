//! Notification service client (best-effort OTP delivery)
//!
//! Codes go out on two channels (in-app message and SMS) to the shipper and,
//! when different, the named recipient. Delivery failures are logged and never
//! fail the transition that issued the code.

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct NotificationService {
    client: Client,
    base_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct OtpNotification<'a> {
    /// "message" or "sms"
    channel: &'a str,
    /// Account-service user id (shipper) or raw phone (recipient)
    to: &'a str,
    code: &'a str,
    entry_id: i32,
    context: &'a str,
}

impl NotificationService {
    /// `base_url = None` disables delivery (local development)
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Deliver a pickup/delivery code; `context` is "pickup" or "delivery".
    /// The shipper always gets the code; the named recipient gets it too when
    /// a contact number is present.
    pub async fn send_otp(
        &self,
        entry_id: i32,
        shipper_id: &str,
        recipient_phone: &str,
        code: &str,
        context: &str,
    ) {
        let Some(base_url) = &self.base_url else {
            debug!(entry_id, context, "Notification service not configured, skipping OTP delivery");
            return;
        };

        let mut deliveries: Vec<OtpNotification> = vec![
            OtpNotification {
                channel: "message",
                to: shipper_id,
                code,
                entry_id,
                context,
            },
            OtpNotification {
                channel: "sms",
                to: shipper_id,
                code,
                entry_id,
                context,
            },
        ];

        if !recipient_phone.is_empty() {
            deliveries.push(OtpNotification {
                channel: "message",
                to: recipient_phone,
                code,
                entry_id,
                context,
            });
            deliveries.push(OtpNotification {
                channel: "sms",
                to: recipient_phone,
                code,
                entry_id,
                context,
            });
        }

        let url = format!("{}/notifications/otp", base_url);
        for delivery in deliveries {
            if let Err(e) = self
                .client
                .post(&url)
                .json(&delivery)
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                warn!(
                    entry_id,
                    channel = delivery.channel,
                    error = %e,
                    "OTP delivery failed"
                );
            }
        }
    }
}
