use crate::infra::build_messaging;
use campus_messaging::config::MessagingConfig;
use campus_messaging::error::AppError;
use campus_messaging::messaging::{frame, NewMessage, Subscription};
use clap::Args;
use std::time::Duration;
use tokio::task::JoinSet;

const DRAIN_POLL: Duration = Duration::from_millis(20);
const DRAIN_LIMIT: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of messages to create
    #[arg(long, default_value_t = 6)]
    pub(crate) messages: usize,
    /// Number of simulated stream clients competing for notifications
    #[arg(long, default_value_t = 2)]
    pub(crate) dispatchers: usize,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            messages: 6,
            dispatchers: 2,
        }
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let messaging = build_messaging(&MessagingConfig::default())?;

    let mut clients = JoinSet::new();
    for _ in 0..args.dispatchers.max(1) {
        let subscription = messaging.dispatchers.attach()?;
        clients.spawn(collect(subscription));
    }

    println!("=== Campus Messaging Demo ===");
    println!(
        "Creating {} message(s) for {} stream client(s)",
        args.messages,
        args.dispatchers.max(1)
    );

    for index in 1..=args.messages {
        let stored = messaging.service.create_message(NewMessage::new(
            "registrar@campus.edu",
            format!("student{index}@campus.edu"),
            format!("Enrollment update #{index}"),
        ))?;
        println!("  stored message {} for {}", stored.id, stored.recipient);
    }

    wait_for_drain(&messaging.queue).await;
    let report = messaging.dispatchers.shutdown().await;

    println!();
    println!("Frames per stream client:");
    let mut delivered = 0;
    let mut outcomes = Vec::new();
    while let Some(result) = clients.join_next().await {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => println!("  client task failed: {err}"),
        }
    }
    outcomes.sort_by_key(|(id, _)| *id);
    for (id, frames) in outcomes {
        println!("  client {id}: {} frame(s)", frames.len());
        for item in &frames {
            print!("    {}", frame(item));
        }
        delivered += frames.len();
    }

    let stats = messaging.queue.stats();
    println!(
        "Delivered {delivered} of {} notification(s); {} left queued, {} dropped",
        stats.enqueued, stats.depth, stats.dropped
    );
    println!(
        "Dispatchers stopped: {} clean, {} failed",
        report.completed, report.failed
    );
    Ok(())
}

async fn collect(mut subscription: Subscription) -> (u64, Vec<String>) {
    let id = subscription.id();
    let mut received = Vec::new();
    while let Some(item) = subscription.next().await {
        received.push(item);
    }
    (id, received)
}

async fn wait_for_drain(queue: &campus_messaging::messaging::NotificationQueue) {
    let _ = tokio::time::timeout(DRAIN_LIMIT, async {
        while !queue.is_empty() {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    })
    .await;
}
