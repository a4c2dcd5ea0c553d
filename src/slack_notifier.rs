use anyhow::{Context, Result};
use log::{debug, info};
use slack_morphism::prelude::*;

use crate::config::SlackConfig;

pub struct SlackNotifier {
    client: SlackClient<SlackClientHyperHttpsConnector>,
    token: SlackApiToken,
    channel_id: SlackChannelId,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig) -> Result<Self> {
        info!("Initializing Slack notifier");

        let client = SlackClient::new(SlackClientHyperHttpsConnector::new()?);
        let token = SlackApiToken::new(config.bot_token.clone().into());
        let channel_id = SlackChannelId::new(config.channel_id.clone());

        Ok(SlackNotifier {
            client,
            token,
            channel_id,
        })
    }

    /// Post a plain message to the configured channel
    pub async fn send_message(&self, text: &str) -> Result<()> {
        debug!("Sending Slack message ({} chars)", text.len());

        let post_chat_req = SlackApiChatPostMessageRequest::new(
            self.channel_id.clone(),
            SlackMessageContent::new().with_text(text.to_string()),
        );

        let session = self.client.open_session(&self.token);

        let response = session.chat_post_message(&post_chat_req)
            .await
            .context("Unable to send Slack message")?;

        debug!("Slack message sent: {:?}", response.ts);
        Ok(())
    }
}
