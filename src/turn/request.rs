//! Conversion of conversation messages into the backend request shape.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::assistant::Assistant;
use crate::attachment::{is_remote, read_base64};
use crate::error::{ParleyError, Result};
use crate::types::{Attachment, Message, Role};

use super::Engine;

impl Engine {
    /// Build the outbound message list.
    ///
    /// Reasoning, tool-call and error messages stay local. The final user
    /// message is trimmed, unwrapped if it holds a JSON message, and has its
    /// attachments resolved.
    pub async fn request_messages(
        &self,
        assistant: &Assistant,
        messages: &[Message],
    ) -> Result<Vec<Value>> {
        let last = messages.len().saturating_sub(1);
        let mut out = Vec::with_capacity(messages.len());

        for (index, message) in messages.iter().enumerate() {
            if !message.content_type().is_model_visible() {
                continue;
            }

            let is_input = index == last && message.role == Role::User;
            if message.text.trim().is_empty() && message.attachments.is_empty() {
                if is_input {
                    return Err(ParleyError::invalid_input("content should not be empty"));
                }
                trace!(index, "skipping empty message");
                continue;
            }

            let mut request = json!({
                "role": message.role,
                "content": message.text,
            });
            if let Some(name) = &message.name {
                request["name"] = match message.role {
                    Role::System => Value::String(name.clone()),
                    _ => Value::String(hash_name(name)),
                };
            }

            if is_input {
                let input = Message::from_string(message.text.trim(), Role::User)?;
                request["content"] = Value::String(input.text.clone());

                if !message.attachments.is_empty() {
                    if assistant.vision {
                        let parts = self.vision_parts(&input.text, &message.attachments).await?;
                        request["content"] = Value::Array(parts);
                    } else {
                        out.extend(describe_attachments(&message.attachments)?);
                    }
                }
            }

            out.push(request);
        }

        if self.config.print_request_messages {
            let dump = Value::Array(out.clone());
            debug!(assistant_id = %assistant.id, messages = %dump, "outbound request messages");
        }
        Ok(out)
    }

    /// `text` + `image_url` content parts for a vision-capable model.
    async fn vision_parts(&self, text: &str, attachments: &[Attachment]) -> Result<Vec<Value>> {
        let mut parts = vec![json!({"type": "text", "text": text})];

        for attachment in attachments.iter().filter(|a| a.is_image()) {
            let url = if is_remote(&attachment.url) {
                attachment.url.clone()
            } else {
                let files = self.files.as_deref().ok_or_else(|| {
                    ParleyError::Configuration("file store is not configured".to_string())
                })?;
                let data = read_base64(files, &attachment.url).await?;
                format!("data:{};base64,{}", attachment.content_type, data)
            };
            parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
        }
        Ok(parts)
    }
}

/// Textual stand-ins for images sent to a model that cannot see them.
fn describe_attachments(attachments: &[Attachment]) -> Result<Vec<Value>> {
    attachments
        .iter()
        .filter(|a| a.is_image())
        .map(|attachment| -> Result<Value> {
            Ok(json!({
                "role": "system",
                "content": serde_json::to_string(attachment)?,
            }))
        })
        .collect()
}

/// Participant names are not sent to the model in clear text.
fn hash_name(name: &str) -> String {
    Sha256::digest(name.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
