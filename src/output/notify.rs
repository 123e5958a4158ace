//! Webhook notifier: emits a chat-service "embed" payload summarizing
//! the run. A no-op when no webhook URL is configured.

use crate::core::{HttpClient, ScreenError};
use crate::model::Batch;
use serde::Serialize;
use serde_json::json;

const MAX_FIELDS: usize = 25;
const MAX_PLAIN_CHARS: usize = 2000;
const COLOR_BULLISH: u32 = 0x2ECC71;

#[derive(Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

pub async fn notify(http: &HttpClient, webhook_url: Option<&str>, mode: &str, batch: &Batch) -> Result<(), ScreenError> {
    let Some(url) = webhook_url else {
        return Ok(());
    };

    let fields: Vec<EmbedField> = batch
        .iter()
        .take(MAX_FIELDS)
        .map(|row| EmbedField {
            name: format!("{} {}", row.id, row.name),
            value: format!("{:.2} ({:+.2}%)", row.price, row.change_pct),
            inline: true,
        })
        .collect();

    let mut description = format!("{} candidates passed the {mode} chain", batch.len());
    if description.len() > MAX_PLAIN_CHARS {
        description.truncate(MAX_PLAIN_CHARS);
    }

    let payload = json!({
        "embeds": [{
            "title": format!("Screener run ({mode})"),
            "description": description,
            "color": COLOR_BULLISH,
            "timestamp": chrono::Local::now().to_rfc3339(),
            "footer": { "text": "tw-screener" },
            "fields": fields,
        }]
    });

    let parsed_url = url::Url::parse(url).map_err(ScreenError::from)?;
    http.post_json(parsed_url, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_op_when_webhook_url_is_absent() {
        let http = HttpClient::default();
        let batch = Batch::new();
        let result = notify(&http, None, "left", &batch).await;
        assert!(result.is_ok());
    }
}
