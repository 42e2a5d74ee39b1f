use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{
    select,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::CallProcessor;

#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub call_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
}

pub type ProcessingSender = UnboundedSender<ProcessingJob>;
pub type ProcessingReceiver = UnboundedReceiver<ProcessingJob>;

/// Handle used by request handlers to schedule call processing.
#[derive(Clone)]
pub struct ProcessingQueue {
    sender: ProcessingSender,
}

impl ProcessingQueue {
    pub fn enqueue(&self, call_id: Uuid) -> Result<()> {
        self.sender
            .send(ProcessingJob {
                call_id,
                enqueued_at: Utc::now(),
            })
            .map_err(|_| anyhow::anyhow!("processing worker is not running"))
    }
}

pub struct ProcessingManager {
    pub queue: ProcessingQueue,
    processor: CallProcessor,
    cancel_token: CancellationToken,
    receiver: ProcessingReceiver,
}

pub struct ProcessingManagerBuilder {
    cancel_token: Option<CancellationToken>,
    processor: Option<CallProcessor>,
}

impl ProcessingManagerBuilder {
    pub fn new() -> Self {
        Self {
            cancel_token: None,
            processor: None,
        }
    }

    pub fn with_cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = Some(cancel_token);
        self
    }

    pub fn with_processor(mut self, processor: CallProcessor) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn build(self) -> Result<ProcessingManager> {
        let processor = self
            .processor
            .ok_or_else(|| anyhow::anyhow!("processing worker requires a call processor"))?;
        let (sender, receiver) = unbounded_channel();
        Ok(ProcessingManager {
            queue: ProcessingQueue { sender },
            processor,
            cancel_token: self.cancel_token.unwrap_or_default(),
            receiver,
        })
    }
}

impl ProcessingManager {
    pub async fn serve(&mut self) {
        let token = self.cancel_token.clone();

        select! {
            _ = self.cancel_token.cancelled() => {
                info!("ProcessingManager cancelled");
            }
            _ = Self::recv_loop(token, self.processor.clone(), &mut self.receiver) => {
                info!("ProcessingManager queue closed");
            }
        }
    }

    async fn recv_loop(
        cancel_token: CancellationToken,
        processor: CallProcessor,
        receiver: &mut ProcessingReceiver,
    ) {
        while let Some(job) = receiver.recv().await {
            let token = cancel_token.clone();
            let processor = processor.clone();
            tokio::spawn(async move {
                select! {
                    _ = token.cancelled() => {
                        warn!(call_id = %job.call_id, "processing interrupted by shutdown");
                    }
                    _ = Self::run_job(&processor, &job) => {}
                }
            });
        }
    }

    async fn run_job(processor: &CallProcessor, job: &ProcessingJob) {
        let waited = Utc::now() - job.enqueued_at;
        info!(
            call_id = %job.call_id,
            queued_ms = waited.num_milliseconds(),
            "processing call"
        );
        if let Err(e) = processor.process_call(job.call_id).await {
            error!(call_id = %job.call_id, "failed to process call: {}", e);
            if let Err(e) = processor.mark_failed(job.call_id, &e.to_string()).await {
                error!(call_id = %job.call_id, "failed to mark call as failed: {}", e);
            }
        }
    }
}
