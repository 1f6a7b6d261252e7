//! Registry and dispatcher walkthrough.
//!
//! Registers a dispatcher and two components that depend on it, runs their
//! init hooks in dependency order, pushes some traffic through broadcast and
//! queue topics, then shuts everything down in reverse.
//!
//! ```text
//! RUST_LOG=debug cargo run -p plugboard-demo
//! ```

use anyhow::Context as _;
use plugboard_core::{
    Component, ComponentError, Context, HandlerError, Lookup, Message, ServerOption, async_trait,
};
use plugboard_runtime::{DISPATCHER_COMPONENT, Dispatcher, DispatcherConfig, Registry};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
struct SignupEvent {
    email: String,
}

/// Sends welcome mail for every signup, spread across two senders.
#[derive(Default)]
struct Mailer {
    sent: Arc<AtomicUsize>,
}

#[async_trait]
impl Component for Mailer {
    fn name(&self) -> &str {
        "mailer"
    }

    fn deps(&self) -> Vec<String> {
        vec![DISPATCHER_COMPONENT.into()]
    }

    async fn init(&self, _ctx: &Context, lookup: &dyn Lookup) -> Result<(), ComponentError> {
        let dispatcher = lookup
            .get_as::<Dispatcher>(DISPATCHER_COMPONENT)
            .ok_or_else(|| ComponentError::msg("dispatcher not registered"))?;

        for sender in ["smtp-a", "smtp-b"] {
            let sent = Arc::clone(&self.sent);
            dispatcher.subscribe_queue("mail.welcome", move |_ctx: Context, msg: Message| {
                let sent = Arc::clone(&sent);
                async move {
                    let email = msg
                        .data::<String>()
                        .ok_or_else(|| HandlerError::msg("expected an address"))?;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    sent.fetch_add(1, Ordering::SeqCst);
                    info!(sender, email = %email, "welcome mail sent");
                    Ok::<(), HandlerError>(())
                }
            });
        }
        Ok(())
    }

    async fn shutdown(&self, _ctx: &Context) -> Result<(), ComponentError> {
        info!(sent = self.sent.load(Ordering::SeqCst), "mailer stopped");
        Ok(())
    }
}

/// Listens for signups and turns each into a mail job.
struct Onboarding;

#[async_trait]
impl Component for Onboarding {
    fn name(&self) -> &str {
        "onboarding"
    }

    fn deps(&self) -> Vec<String> {
        vec![DISPATCHER_COMPONENT.into()]
    }

    fn opt_deps(&self) -> Vec<String> {
        vec!["mailer".into(), "audit".into()]
    }

    async fn init(&self, _ctx: &Context, lookup: &dyn Lookup) -> Result<(), ComponentError> {
        let dispatcher = lookup
            .get_as::<Dispatcher>(DISPATCHER_COMPONENT)
            .ok_or_else(|| ComponentError::msg("dispatcher not registered"))?;

        // The handler lives inside the dispatcher, so it only holds a weak
        // reference back to it.
        let queue = Arc::downgrade(&dispatcher);
        dispatcher.subscribe("user.signup", move |_ctx: Context, msg: Message| {
            let queue = queue.upgrade();
            async move {
                if let (Some(queue), Some(event)) = (queue, msg.data::<SignupEvent>()) {
                    queue.enqueue("mail.welcome", event.email.clone()).await;
                }
                Ok(())
            }
        });
        Ok(())
    }

    fn server_options(&self) -> Vec<ServerOption> {
        vec![ServerOption::new("route:/signup")]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,plugboard_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    plugboard_runtime::metrics::describe_metrics();

    let config = DispatcherConfig::from_env().context("reading dispatcher config")?;
    let dispatcher = Arc::new(Dispatcher::new(config));

    let mut registry = Registry::new();
    registry.register(Arc::new(Onboarding))?;
    registry.register(Arc::new(Mailer::default()))?;
    registry.register(Arc::clone(&dispatcher))?;

    let ctx = Context::background();
    registry.init(&ctx).await?;
    info!(order = ?registry.init_order(), options = registry.server_options().len(), "registry ready");

    for email in ["ada@example.com", "grace@example.com", "linus@example.com"] {
        dispatcher
            .publish(
                "user.signup",
                SignupEvent {
                    email: email.to_string(),
                },
            )
            .await;
    }

    // Mail jobs are enqueued before the signup jobs finish, so one wait
    // covers both.
    dispatcher
        .wait(&ctx.with_timeout(Duration::from_secs(2)))
        .await
        .context("waiting for signups")?;

    registry
        .shutdown(&ctx.with_timeout(Duration::from_secs(5)))
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signup_handler_does_not_keep_dispatcher_alive() {
        let dispatcher = Arc::new(Dispatcher::default());
        let weak = Arc::downgrade(&dispatcher);

        let mut registry = Registry::new();
        registry.register(Arc::new(Onboarding)).unwrap();
        registry.register(Arc::clone(&dispatcher)).unwrap();
        registry.init(&Context::background()).await.unwrap();
        assert_eq!(dispatcher.subscriber_count("user.signup"), 1);

        drop(registry);
        drop(dispatcher);

        assert!(weak.upgrade().is_none());
    }
}
