use anyhow::{Context, Result};
use log::debug;

use crate::config::{Config, SearchConfig};
use crate::email::{self, BaseEmailProcessor, EmailProcessingStrategy};
use crate::gmail_client::GmailClient;
use crate::ledger::Ledger;
use crate::openai_client::OpenAiClient;
use crate::slack_notifier::SlackNotifier;
use super::extractor::{ConfirmationExtractor, Extraction};

/// Golf confirmation specific processing strategy
pub struct GolfStrategy {
    search: SearchConfig,
    extractor: ConfirmationExtractor<OpenAiClient>,
}

impl GolfStrategy {
    pub fn new(config: &Config) -> Self {
        GolfStrategy {
            search: config.search.clone(),
            extractor: ConfirmationExtractor::new(OpenAiClient::new(&config.openai)),
        }
    }
}

impl EmailProcessingStrategy for GolfStrategy {
    fn search_emails<'a, 'b: 'a>(&'a self, gmail: &'b GmailClient) ->
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(gmail.search_confirmation_emails(&self.search))
    }

    fn process_single_email<'a, 'b: 'a, 'c: 'a>(
        &'a self,
        gmail: &'b GmailClient,
        ledger: Option<&'c Ledger>,
        slack: Option<&'c SlackNotifier>,
        message_id: &'a str,
        is_dry_run: bool,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<usize>> + Send + 'a>> {
        Box::pin(async move {
            debug!("Processing golf confirmation email ID: {}", message_id);

            // Fetch the payload tree plus subject/date for diagnostics
            let (payload, meta) = gmail.fetch_email_full(message_id).await?;

            // Flatten the payload into a plain-text body
            let body = email::extract(&payload);

            if is_dry_run {
                println!("\n📧 Email: {}", meta.subject);
                println!("📅 Date: {}", meta.date);
                println!("📄 Body ({} chars, first 500 shown):\n{}\n",
                         body.len(),
                         &body.chars().take(500).collect::<String>());
            }

            // Run the body through the extraction service
            let extraction = self.extractor.extract_confirmation(&body, &meta).await
                .context("Confirmation extraction failed")?;

            let record = match extraction {
                Extraction::Accepted(record) => record,
                Extraction::Rejected(rejection) => {
                    if is_dry_run {
                        println!("⛳ No confirmation: {}", rejection);
                    }
                    // Rejections are expected outcomes, not processing errors
                    return Ok(0);
                }
            };

            if is_dry_run {
                println!("⛳ Confirmation extracted:");
                println!("   🏌️  Course: {}", record.course_name);
                println!("   📆 Date: {}", record.date);
                println!("   💵 Course fees: {:.2} (convenience: {:.2})",
                         record.course_fees, record.convenience_fees);
                println!("   💳 Paid online: {:.2} / due at course: {:.2}",
                         record.paid_online, record.due_at_course);
                println!("   👥 Players: {}", record.number_of_players);
                if record.is_cancellation {
                    println!("   ⚠️  Cancellation email");
                }
                println!();
            } else if let Some(ledger) = ledger {
                ledger.append(&record)?;

                // Send Slack notification
                if let Some(slack) = slack {
                    let message = format!(
                        "⛳ New confirmation: {} on {} - {:.2} for {} player(s)\nFrom: {}",
                        record.course_name,
                        record.date,
                        record.course_fees,
                        record.number_of_players,
                        meta.subject
                    );

                    let _ = slack.send_message(&message).await;
                }
            }

            // One accepted record for this email
            Ok(1)
        })
    }

    fn mark_email_processed<'a, 'b: 'a>(
        &'a self,
        gmail: &'b GmailClient,
        message_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(gmail.mark_email_as_processed(message_id))
    }

    fn processor_name(&self) -> &str {
        "Golf confirmation"
    }

    fn search_description(&self) -> &str {
        &self.search.query
    }
}

/// Golf confirmation email processor (wrapper around BaseEmailProcessor)
pub struct GolfEmailProcessor {
    base: BaseEmailProcessor<GolfStrategy>,
}

impl GolfEmailProcessor {
    pub fn new(config: Config) -> Result<Self> {
        let strategy = GolfStrategy::new(&config);
        Ok(GolfEmailProcessor {
            base: BaseEmailProcessor::new(config, strategy)?,
        })
    }

    pub fn new_dry_run(config: Config) -> Result<Self> {
        let strategy = GolfStrategy::new(&config);
        Ok(GolfEmailProcessor {
            base: BaseEmailProcessor::new_dry_run(config, strategy)?,
        })
    }

    pub async fn process_emails(&self, limit: Option<usize>) -> Result<usize> {
        self.base.process_emails(limit).await
    }

    pub async fn process_emails_dry_run(&self, limit: Option<usize>) -> Result<usize> {
        self.base.process_emails_dry_run(limit).await
    }
}
