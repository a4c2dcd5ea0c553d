use anyhow::{Context, Result};
use google_gmail1::{hyper, hyper_rustls, oauth2, Gmail};
use log::{debug, info, warn};

use crate::config::{GmailConfig, SearchConfig};
use crate::email::{MessageMeta, MessagePart};

const PROCESSED_LABEL: &str = "golftracker/processed";

pub struct GmailClient {
    hub: Gmail<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>,
}

impl GmailClient {
    pub async fn new(config: &GmailConfig) -> Result<Self> {
        info!("Connecting to Gmail API via OAuth2");

        // Read OAuth2 client credentials from file
        let secret = oauth2::read_application_secret(&config.credentials_path)
            .await
            .context("Unable to read OAuth2 client credentials file")?;

        // Create authenticator with token persistence
        // Note: We use Scope::Modify on all API calls, which is the broadest scope available
        // in google-gmail1 (covers reading, modifying labels, and managing emails)
        let auth = oauth2::InstalledFlowAuthenticator::builder(
            secret,
            oauth2::InstalledFlowReturnMethod::HTTPRedirect,
        )
        .persist_tokens_to_disk(&config.token_cache_path)
        .build()
        .await
        .context("Unable to create OAuth2 authenticator")?;

        // Create HTTP client
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .build();

        let client = hyper::Client::builder().build(connector);

        // Create Gmail hub with appropriate scopes
        let hub = Gmail::new(client, auth);

        info!("✅ Gmail API connection established successfully");

        Ok(GmailClient { hub })
    }

    /// Search the inbox for candidate confirmation emails and return their IDs
    pub async fn search_confirmation_emails(&self, search: &SearchConfig) -> Result<Vec<String>> {
        let mut query = search.query.clone();
        if let Some(before) = &search.before_date {
            query.push_str(&format!(" before:{}", before));
        }

        info!("Searching inbox for emails matching '{}'", query);

        let user_id = "me";

        let result = self.hub
            .users()
            .messages_list(user_id)
            .q(&query)
            .add_label_ids("INBOX")
            .max_results(search.max_results)
            .add_scope(google_gmail1::api::Scope::Modify)
            .doit()
            .await
            .context("Error searching for emails")?;

        let message_ids: Vec<String> = result.1
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|msg| msg.id)
            .collect();

        info!("Found {} email(s) matching '{}'", message_ids.len(), query);

        Ok(message_ids)
    }

    /// Retrieve the full payload tree of an email plus its subject/date headers
    pub async fn fetch_email_full(&self, message_id: &str) -> Result<(MessagePart, MessageMeta)> {
        debug!("Full email retrieval for ID: {}", message_id);

        let user_id = "me";

        let result = self.hub
            .users()
            .messages_get(user_id, message_id)
            .format("full")
            .add_scope(google_gmail1::api::Scope::Modify)
            .doit()
            .await
            .context("Unable to retrieve email")?;

        let payload = result.1.payload
            .context("No payload in email")?;

        // Extract subject and date from headers before consuming the payload
        let mut subject = String::from("No Subject");
        let mut date = String::from("No Date");

        if let Some(headers) = &payload.headers {
            for header in headers {
                if let (Some(name), Some(value)) = (&header.name, &header.value) {
                    match name.as_str() {
                        "Subject" => subject = value.clone(),
                        "Date" => date = value.clone(),
                        _ => {}
                    }
                }
            }
        }

        let meta = MessageMeta {
            id: message_id.to_string(),
            subject,
            date,
        };

        let part = convert_payload(payload);

        debug!("Email retrieved: '{}' ({})", meta.subject, meta.date);

        Ok((part, meta))
    }

    pub async fn mark_email_as_processed(&self, message_id: &str) -> Result<()> {
        info!("Marking email {} as processed", message_id);

        let user_id = "me";

        // First, retrieve existing labels to get IDs
        let labels_result = self.hub
            .users()
            .labels_list(user_id)
            .add_scope(google_gmail1::api::Scope::Modify)
            .doit()
            .await
            .context("Unable to list labels")?;

        let labels = labels_result.1.labels.unwrap_or_default();

        let processed_label_id = labels.iter()
            .find(|l| l.name.as_deref() == Some(PROCESSED_LABEL))
            .and_then(|l| l.id.clone());

        let unread_label_id = labels.iter()
            .find(|l| l.name.as_deref() == Some("UNREAD"))
            .and_then(|l| l.id.clone());

        // Create modification request
        let mut modify_request = google_gmail1::api::ModifyMessageRequest::default();

        // Mark as read
        if let Some(unread_id) = unread_label_id {
            modify_request.remove_label_ids = Some(vec![unread_id]);
            debug!("Marking as read");
        }

        // Add the processed label
        if let Some(processed_id) = processed_label_id {
            modify_request.add_label_ids = Some(vec![processed_id]);
            debug!("Adding label '{}'", PROCESSED_LABEL);
        } else {
            warn!("Label '{}' not found, it will need to be created in Gmail", PROCESSED_LABEL);
        }

        // Apply modifications
        self.hub
            .users()
            .messages_modify(modify_request, user_id, message_id)
            .add_scope(google_gmail1::api::Scope::Modify)
            .doit()
            .await
            .context("Unable to modify email labels")?;

        info!("✅ Email {} marked as processed", message_id);
        Ok(())
    }
}

/// Convert a Gmail API payload tree into the extraction model. The API
/// decodes `body.data` during deserialization, so leaf payloads are
/// re-encoded to the wire form the extractor expects.
fn convert_payload(part: google_gmail1::api::MessagePart) -> MessagePart {
    let mime_type = part.mime_type.unwrap_or_default();

    let children: Vec<MessagePart> = part.parts
        .unwrap_or_default()
        .into_iter()
        .map(convert_payload)
        .collect();

    if children.is_empty() {
        if let Some(data) = part.body.and_then(|b| b.data) {
            return MessagePart::leaf(&mime_type, &data);
        }
    }

    MessagePart::container(&mime_type, children)
}
