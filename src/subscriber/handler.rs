//! Per-message handling: decode, render, acknowledge.

use chrono::{DateTime, Local};

use super::Delivery;
use crate::core::compression::{gunzip_utf8, Payload};
use crate::types::{InboundMessage, MessageMetadata, ATTR_CONTENT_ENCODING, ATTR_FIELDS, ATTR_LOG_COUNT};
use crate::Result;

/// Timestamp layout of the "Received msg at" line.
const RECEIVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render the output block for one message.
///
/// The block starts with two newlines so consecutive blocks are separated by
/// a blank line, and ends with a newline.
pub fn render_event(message: &InboundMessage, received_at: DateTime<Local>) -> Result<String> {
    let metadata = MessageMetadata::decode(&message.message_id)?;

    let mut lines = vec![
        format!(
            "\n\nReceived msg at {} with partition {} offset {}",
            received_at.format(RECEIVED_AT_FORMAT),
            metadata.partition,
            metadata.cursor
        ),
        "Attributes:".to_string(),
        format!("{}: {}", ATTR_CONTENT_ENCODING, message.attribute(ATTR_CONTENT_ENCODING)?),
        format!("{}: {}", ATTR_LOG_COUNT, message.attribute(ATTR_LOG_COUNT)?),
        format!("{}: {}", ATTR_FIELDS, message.attribute(ATTR_FIELDS)?),
    ];

    // Test traffic is not always gzip; such payloads just lose the event section.
    if let Payload::Decompressed(event) = gunzip_utf8(&message.data) {
        lines.push("Transaction event:".to_string());
        lines.push(event);
    }

    let mut block = lines.join("\n");
    block.push('\n');
    Ok(block)
}

/// Render a delivery, then acknowledge it.
///
/// On a fault the delivery is dropped un-acked and its permit released.
pub fn handle_delivery(delivery: Delivery, received_at: DateTime<Local>) -> Result<String> {
    let Delivery { message, ack } = delivery;
    let block = render_event(&message, received_at)?;
    ack.ack();
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compression::gzip;
    use crate::subscriber::ack::AckHandle;
    use crate::Error;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    fn received_at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2022, 2, 2, 15, 40, 0).unwrap()
    }

    fn message(data: Vec<u8>) -> InboundMessage {
        InboundMessage {
            message_id: MessageMetadata::new(2, 77).encode(),
            attributes: HashMap::from([
                ("Content-Encoding".to_string(), "gzip".to_string()),
                ("Log-Count".to_string(), "1".to_string()),
                ("Fields".to_string(), "user,url".to_string()),
            ]),
            data,
            publish_time: None,
        }
    }

    #[test]
    fn test_render_gzip_event() {
        let block = render_event(&message(gzip(b"alice,https://example.com").unwrap()), received_at()).unwrap();

        assert_eq!(
            block,
            "\n\nReceived msg at 2022-02-02 15:40:00.000000 with partition 2 offset 77\n\
             Attributes:\n\
             Content-Encoding: gzip\n\
             Log-Count: 1\n\
             Fields: user,url\n\
             Transaction event:\n\
             alice,https://example.com\n"
        );
    }

    #[test]
    fn test_render_non_gzip_omits_event() {
        let block = render_event(&message(b"plain".to_vec()), received_at()).unwrap();

        assert!(block.contains("Fields: user,url\n"));
        assert!(!block.contains("Transaction event:"));
        assert!(!block.contains("plain"));
    }

    #[test]
    fn test_render_missing_attribute() {
        let mut msg = message(Vec::new());
        msg.attributes.remove("Log-Count");

        assert!(matches!(
            render_event(&msg, received_at()),
            Err(Error::MissingAttribute(key)) if key == "Log-Count"
        ));
    }

    #[test]
    fn test_render_malformed_id() {
        let mut msg = message(Vec::new());
        msg.message_id = "12345".to_string();

        assert!(matches!(
            render_event(&msg, received_at()),
            Err(Error::InvalidMessageId(_))
        ));
    }

    #[tokio::test]
    async fn test_handle_acks_regardless_of_payload() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        for (ack_id, data) in [("a", gzip(b"event").unwrap()), ("b", b"not gzip".to_vec())] {
            let delivery = Delivery {
                message: message(data),
                ack: AckHandle::new(ack_id, tx.clone(), None),
            };
            handle_delivery(delivery, received_at()).unwrap();
        }
        drop(tx);

        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.as_deref(), Some("b"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_handle_fault_does_not_ack() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut msg = message(Vec::new());
        msg.attributes.clear();

        let delivery = Delivery {
            message: msg,
            ack: AckHandle::new("c", tx, None),
        };
        assert!(handle_delivery(delivery, received_at()).is_err());
        assert!(rx.recv().await.is_none());
    }
}
