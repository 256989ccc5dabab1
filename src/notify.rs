use tracing::{debug, error};

/// Discord webhook poster for the operator channel.
///
/// Fire-and-forget: delivery failures are logged locally and never propagated,
/// so a dead webhook can never take down a run. With no URL configured every
/// post is a no-op.
pub struct Notifier {
    http: reqwest::Client,
    webhook_url: Option<String>,
    prefix: String,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>, network_name: &str, dry_run: bool) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url,
            prefix: message_prefix(network_name, dry_run),
        }
    }

    pub async fn post(&self, message: &str) {
        let Some(url) = &self.webhook_url else {
            debug!("No Discord webhook configured; dropping notification");
            return;
        };

        let body = serde_json::json!({
            "content": format!("{}{}", self.prefix, message),
        });

        match self.http.post(url).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                error!(
                    "Failed to send Discord notification: {} {}",
                    response.status().as_u16(),
                    response.status().canonical_reason().unwrap_or("unknown")
                );
            }
            Ok(_) => {}
            Err(e) => error!("Error sending Discord notification: {e}"),
        }
    }
}

fn message_prefix(network_name: &str, dry_run: bool) -> String {
    if dry_run {
        format!("[🌐 {network_name}] [🌵 DRY RUN] ")
    } else {
        format!("[🌐 {network_name}] ")
    }
}
