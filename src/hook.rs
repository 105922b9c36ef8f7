//! Session-end hook.
//!
//! Wires the notification pipeline into the test run's lifecycle. The
//! pipeline fires exactly once, after the session's report store is sealed,
//! and never affects the run itself: no webhook configured means no work,
//! and no failure here ever changes the process exit status.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::options::OptResolver;
use crate::render::{self, CiContext, RenderInput};
use crate::session::{LineSink, Session, TerminalSink};
use crate::stats::{self, Outcome};
use crate::webhook::{self, WebhookMessage};

/// Observer notified when a test session finishes.
///
/// The one plugin seam this crate exposes: anything that drives a session
/// (the bundled runner, the JUnit ingestion path, an embedding program)
/// calls [`on_session_end`](Self::on_session_end) exactly once.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Called once, after the session's report store is sealed.
    async fn on_session_end(&self, session: &Session);
}

/// Posts a session summary to a Discord channel.
///
/// Settings are resolved through the [`OptResolver`] chain when the hook
/// fires and stay frozen for that pipeline run.
pub struct DiscordNotifier {
    resolver: OptResolver,
    ci: CiContext,
    sink: Mutex<Box<dyn LineSink>>,
}

impl DiscordNotifier {
    /// Creates a notifier that writes diagnostics to the terminal and
    /// detects CI execution from the environment.
    pub fn new(resolver: OptResolver) -> Self {
        Self {
            resolver,
            ci: CiContext::detect(),
            sink: Mutex::new(Box::new(TerminalSink)),
        }
    }

    /// Replaces the diagnostic output sink.
    pub fn with_sink(mut self, sink: impl LineSink + 'static) -> Self {
        self.sink = Mutex::new(Box::new(sink));
        self
    }

    /// Replaces the detected CI context.
    pub fn with_ci(mut self, ci: CiContext) -> Self {
        self.ci = ci;
        self
    }
}

#[async_trait]
impl SessionObserver for DiscordNotifier {
    async fn on_session_end(&self, session: &Session) {
        let Some(url) = self.resolver.webhook_url() else {
            tracing::debug!("no discord webhook configured, skipping notification");
            return;
        };

        // A session that never properly started has no timing to report.
        let Some(started_at) = session.started_at else {
            tracing::debug!("session has no start time, skipping notification");
            return;
        };

        let verbosity = self.resolver.verbosity(session.verbosity);
        let counts = stats::extract(&session.store);
        let outcome = stats::classify(&counts);

        let avatar_url = match outcome {
            Outcome::Success => self.resolver.success_icon(),
            Outcome::Skip => self.resolver.skip_icon(),
            Outcome::Fail => self.resolver.fail_icon(),
        };

        let rendered = render::render(&RenderInput {
            store: &session.store,
            counts,
            outcome,
            verbosity,
            duration: session.duration,
            started_at,
            ci: self.ci.clone(),
            attach_file: self.resolver.attach_file(),
        });

        tracing::info!(
            tests = counts.total(),
            embeds = rendered.embeds.len(),
            "posting session results to discord"
        );

        let message = WebhookMessage {
            content: rendered.header,
            username: self.resolver.username(),
            avatar_url,
            embeds: rendered.embeds,
            attachment: rendered.attachment,
        };

        let mut sink = self.sink.lock().await;
        webhook::deliver(&url, &message, sink.as_mut()).await;
    }
}
