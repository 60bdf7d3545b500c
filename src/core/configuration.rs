//! Engine configuration.
//!
//! A [`Configuration`] is assembled on one thread, then frozen. Freezing hands
//! the engine a [`FrozenConfiguration`]; every setter called afterwards fails
//! with [`QueueError::IllegalState`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{QueueError, QueueResult};
use crate::core::message::Message;

/// Builds a message from `(queue, content)`.
pub type MessageFactory = Arc<dyn Fn(String, String) -> Message + Send + Sync>;

/// Builds an empty, unpublished queue.
pub type QueueFactory<Q> = Arc<dyn Fn() -> Q + Send + Sync>;

/// Longest lease accepted; longer timeouts are clamped so that
/// `Instant + timeout` cannot overflow.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// When completed messages leave their queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Eviction {
    /// On a later `pull` scan that walks over them.
    #[default]
    Lazy,
    /// Inside `complete`, together with the queue if it became empty.
    Eager,
}

/// Mutable builder for an engine over queue lockable `Q` and map lockable `M`.
pub struct Configuration<Q, M> {
    message: Option<MessageFactory>,
    queue: Option<QueueFactory<Q>>,
    map: Option<M>,
    timeout: Option<Duration>,
    eviction: Eviction,
    numbered: bool,
    frozen: bool,
}

impl<Q, M> Default for Configuration<Q, M> {
    fn default() -> Self {
        Self {
            message: None,
            queue: None,
            map: None,
            timeout: None,
            eviction: Eviction::default(),
            numbered: false,
            frozen: false,
        }
    }
}

impl<Q, M> Configuration<Q, M> {
    pub fn new() -> Self {
        Self::default()
    }

    fn require_not_frozen(&self) -> QueueResult<()> {
        if self.frozen {
            return Err(QueueError::illegal("configuration is frozen"));
        }
        Ok(())
    }

    /// Sets the message constructor; it also decides the lease representation.
    pub fn message(
        &mut self,
        factory: impl Fn(String, String) -> Message + Send + Sync + 'static,
    ) -> QueueResult<&mut Self> {
        self.require_not_frozen()?;
        self.message = Some(Arc::new(factory));
        Ok(self)
    }

    pub fn queue(&mut self, factory: impl Fn() -> Q + Send + Sync + 'static) -> QueueResult<&mut Self> {
        self.require_not_frozen()?;
        self.queue = Some(Arc::new(factory));
        Ok(self)
    }

    pub fn map(&mut self, map: M) -> QueueResult<&mut Self> {
        self.require_not_frozen()?;
        self.map = Some(map);
        Ok(self)
    }

    pub fn timeout(&mut self, timeout: Duration) -> QueueResult<&mut Self> {
        self.require_not_frozen()?;
        self.timeout = Some(timeout.min(MAX_TIMEOUT));
        Ok(self)
    }

    /// Signed-millisecond form of [`timeout`](Self::timeout) for values read
    /// from files or the command line. Negative values are rejected.
    pub fn timeout_ms(&mut self, millis: i64) -> QueueResult<&mut Self> {
        self.require_not_frozen()?;
        let millis = u64::try_from(millis)
            .map_err(|_| QueueError::illegal(format!("negative lease timeout: {millis} ms")))?;
        self.timeout(Duration::from_millis(millis))
    }

    pub fn eviction(&mut self, eviction: Eviction) -> QueueResult<&mut Self> {
        self.require_not_frozen()?;
        self.eviction = eviction;
        Ok(self)
    }

    /// Whether messages get engine-assigned ids (`0, 1, 2, ...`).
    pub fn numbered(&mut self, numbered: bool) -> QueueResult<&mut Self> {
        self.require_not_frozen()?;
        self.numbered = numbered;
        Ok(self)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Validates completeness and hands out the read-only view. Can succeed
    /// only once.
    pub fn freeze(&mut self) -> QueueResult<FrozenConfiguration<Q, M>> {
        self.require_not_frozen()?;

        let missing = [
            ("message", self.message.is_none()),
            ("queue", self.queue.is_none()),
            ("map", self.map.is_none()),
            ("timeout", self.timeout.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(QueueError::illegal(format!(
                "incomplete configuration, missing: {}",
                missing.join(", ")
            )));
        }

        let (Some(message), Some(queue), Some(map), Some(timeout)) = (
            self.message.take(),
            self.queue.take(),
            self.map.take(),
            self.timeout,
        ) else {
            return Err(QueueError::illegal("incomplete configuration"));
        };

        self.frozen = true;
        Ok(FrozenConfiguration {
            message,
            queue,
            map,
            timeout,
            eviction: self.eviction,
            numbered: self.numbered,
        })
    }
}

/// Read-only configuration owned by one engine.
pub struct FrozenConfiguration<Q, M> {
    pub(crate) message: MessageFactory,
    pub(crate) queue: QueueFactory<Q>,
    pub(crate) map: M,
    pub(crate) timeout: Duration,
    pub(crate) eviction: Eviction,
    pub(crate) numbered: bool,
}

impl<Q, M> FrozenConfiguration<Q, M> {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn eviction(&self) -> Eviction {
        self.eviction
    }

    pub fn numbered(&self) -> bool {
        self.numbered
    }
}

impl<Q, M> fmt::Debug for FrozenConfiguration<Q, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenConfiguration")
            .field("timeout", &self.timeout)
            .field("eviction", &self.eviction)
            .field("numbered", &self.numbered)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Config = Configuration<(), ()>;

    fn complete() -> Config {
        let mut config = Config::new();
        config
            .message(Message::plain)
            .unwrap()
            .queue(|| ())
            .unwrap()
            .map(())
            .unwrap()
            .timeout(Duration::from_secs(1))
            .unwrap();
        config
    }

    #[test]
    fn freeze_rejects_later_mutation() {
        let mut config = complete();
        let frozen = config.freeze().unwrap();
        assert_eq!(frozen.timeout(), Duration::from_secs(1));
        assert_eq!(frozen.eviction(), Eviction::Lazy);
        assert!(!frozen.numbered());
        assert!(config.is_frozen());

        assert!(matches!(
            config.timeout(Duration::ZERO),
            Err(QueueError::IllegalState(_))
        ));
        assert!(matches!(config.map(()), Err(QueueError::IllegalState(_))));
        assert!(matches!(
            config.eviction(Eviction::Eager),
            Err(QueueError::IllegalState(_))
        ));
        assert!(matches!(config.freeze(), Err(QueueError::IllegalState(_))));
    }

    #[test]
    fn incomplete_configuration_names_missing_parts() {
        let mut config = Config::new();
        config.map(()).unwrap();

        let err = config.freeze().unwrap_err();
        assert_eq!(
            err,
            QueueError::IllegalState(
                "incomplete configuration, missing: message, queue, timeout".into()
            )
        );
        assert!(!config.is_frozen());

        config
            .message(Message::atomic)
            .unwrap()
            .queue(|| ())
            .unwrap()
            .timeout_ms(250)
            .unwrap();
        assert_eq!(
            config.freeze().unwrap().timeout(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let mut config = Config::new();
        assert!(matches!(
            config.timeout_ms(-1),
            Err(QueueError::IllegalState(_))
        ));
        config.timeout_ms(0).unwrap();
    }

    #[test]
    fn huge_timeouts_are_clamped() {
        let mut config = complete();
        config.timeout(Duration::MAX).unwrap();
        assert_eq!(config.freeze().unwrap().timeout(), MAX_TIMEOUT);
    }
}
