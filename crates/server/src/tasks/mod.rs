//! Background task engine: worker, preprovision loop, webhook delivery.

pub mod preprovision;
pub mod webhook;
pub mod worker;

pub use preprovision::{run_preprovision_loop, run_preprovision_once};
pub use webhook::{WebhookClient, WebhookPayload};
pub use worker::{run_task, run_worker};
