//! Conversation state per session, with automatic idle eviction

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::errors::Result;
use crate::models::Intent;
use crate::models::Message;
use crate::models::Profile;
use crate::models::Role;

/// Read-only view of a session handed to one pipeline turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub profile: Profile,
    /// Every grant id surfaced so far, oldest first, duplicates kept
    pub discussed_grants: Vec<String>,
    pub last_intent: Option<Intent>,
}

impl ConversationContext {
    #[must_use]
    pub fn has_discussed_grants(&self) -> bool {
        !self.discussed_grants.is_empty()
    }

    #[must_use]
    pub fn last_message_is_assistant(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|message| message.role == Role::Assistant)
    }

    /// Last `n` distinct discussed ids, most recent first
    #[must_use]
    pub fn recent_distinct_grants(&self, n: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        self.discussed_grants
            .iter()
            .rev()
            .filter(|id| seen.insert(id.as_str()))
            .take(n)
            .cloned()
            .collect()
    }
}

/// Serializable summary of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub profile: Profile,
    pub discussed_grants: Vec<String>,
    pub last_intent: Option<Intent>,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Session state store. Writers must hold the session's lock for the whole turn.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Snapshot of the session, creating it on first reference
    async fn context(&self, session_id: &str) -> Result<ConversationContext>;

    /// Merge a partial profile and return the merged result
    async fn merge_profile(&self, session_id: &str, update: Profile) -> Result<Profile>;

    /// Append a message; its mentioned grants join the discussed list
    async fn append_message(&self, session_id: &str, message: Message) -> Result<()>;

    async fn set_intent(&self, session_id: &str, intent: Intent) -> Result<()>;

    /// Last `n` distinct discussed grant ids, most recent first
    async fn last_distinct_grants(&self, session_id: &str, n: usize) -> Result<Vec<String>>;

    /// Per-session turn lock
    async fn lock(&self, session_id: &str) -> Arc<Mutex<()>>;

    /// Summary without creating the session
    async fn snapshot(&self, session_id: &str) -> Result<Option<SessionSnapshot>>;
}

#[derive(Debug, Clone)]
struct SessionState {
    messages: Vec<Message>,
    profile: Profile,
    discussed_grants: Vec<String>,
    last_intent: Option<Intent>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    turn_lock: Arc<Mutex<()>>,
}

impl SessionState {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            messages: Vec::new(),
            profile: Profile::default(),
            discussed_grants: Vec::new(),
            last_intent: None,
            created_at: now,
            last_activity: now,
            turn_lock: Arc::new(Mutex::new(())),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Idle past `timeout` with nobody holding or waiting on the turn lock
    fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        Arc::strong_count(&self.turn_lock) == 1
            && (now - self.last_activity)
                .to_std()
                .is_ok_and(|idle| idle > timeout)
    }
}

/// DashMap-backed store with a background sweep of idle sessions
pub struct InMemoryConversationStore {
    sessions: Arc<DashMap<String, SessionState>>,
    session_timeout: Duration,
}

impl InMemoryConversationStore {
    #[must_use]
    pub fn new(session_timeout_secs: u64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            session_timeout: Duration::from_secs(session_timeout_secs),
        }
    }

    /// Start the periodic eviction task. Must be called inside a tokio runtime.
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let timeout = self.session_timeout;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                Self::cleanup_expired_sessions(&sessions, timeout, Utc::now());
            }
        })
    }

    /// Evict sessions idle longer than the timeout as of `now`
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        Self::cleanup_expired_sessions(&self.sessions, self.session_timeout, now)
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn cleanup_expired_sessions(
        sessions: &DashMap<String, SessionState>,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> usize {
        let expired: Vec<String> = sessions
            .iter()
            .filter(|entry| entry.value().is_expired(now, timeout))
            .map(|entry| entry.key().clone())
            .collect();

        // Re-checked under the shard lock; a turn may have started since the scan
        expired
            .iter()
            .filter(|session_id| {
                sessions
                    .remove_if(*session_id, |_, state| state.is_expired(now, timeout))
                    .is_some()
            })
            .inspect(|session_id| tracing::info!("Cleaned up expired session: {}", session_id))
            .count()
    }

    fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionState::new);
        f(entry.value_mut())
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(3600)
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn context(&self, session_id: &str) -> Result<ConversationContext> {
        Ok(self.with_session(session_id, |state| ConversationContext {
            session_id: session_id.to_string(),
            messages: state.messages.clone(),
            profile: state.profile.clone(),
            discussed_grants: state.discussed_grants.clone(),
            last_intent: state.last_intent,
        }))
    }

    async fn merge_profile(&self, session_id: &str, update: Profile) -> Result<Profile> {
        Ok(self.with_session(session_id, |state| {
            state.profile.merge(update);
            state.touch();
            state.profile.clone()
        }))
    }

    async fn append_message(&self, session_id: &str, message: Message) -> Result<()> {
        self.with_session(session_id, |state| {
            state
                .discussed_grants
                .extend(message.grants_mentioned.iter().cloned());
            state.messages.push(message);
            state.touch();
        });
        Ok(())
    }

    async fn set_intent(&self, session_id: &str, intent: Intent) -> Result<()> {
        self.with_session(session_id, |state| state.last_intent = Some(intent));
        Ok(())
    }

    async fn last_distinct_grants(&self, session_id: &str, n: usize) -> Result<Vec<String>> {
        Ok(self.context(session_id).await?.recent_distinct_grants(n))
    }

    async fn lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.with_session(session_id, |state| {
            state.touch();
            Arc::clone(&state.turn_lock)
        })
    }

    async fn snapshot(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        Ok(self.sessions.get(session_id).map(|state| SessionSnapshot {
            session_id: session_id.to_string(),
            profile: state.profile.clone(),
            discussed_grants: state.discussed_grants.clone(),
            last_intent: state.last_intent,
            message_count: state.messages.len(),
            created_at: state.created_at,
            last_activity: state.last_activity,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_created_on_first_reference() {
        let store = InMemoryConversationStore::default();
        assert!(store.snapshot("s1").await.unwrap().is_none());

        let context = store.context("s1").await.unwrap();
        assert_eq!(context.session_id, "s1");
        assert!(context.messages.is_empty());
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_last_distinct_grants_most_recent_first() {
        let store = InMemoryConversationStore::default();
        for ids in [vec!["a", "b"], vec!["c", "a"], vec!["d"]] {
            let message = Message::new(Role::Assistant, "here you go")
                .with_grants(ids.into_iter().map(str::to_string).collect());
            store.append_message("s", message).await.unwrap();
        }

        let recent = store.last_distinct_grants("s", 3).await.unwrap();
        assert_eq!(recent, vec!["d", "a", "c"]);

        let snapshot = store.snapshot("s").await.unwrap().unwrap();
        assert_eq!(snapshot.discussed_grants.len(), 5);
        assert_eq!(snapshot.message_count, 3);
    }

    #[tokio::test]
    async fn test_merge_profile_accumulates() {
        let store = InMemoryConversationStore::default();
        let mut first = Profile::default();
        first.sector.insert("ai".to_string());
        store.merge_profile("s", first).await.unwrap();

        let mut second = Profile::default();
        second.sector.insert("healthcare".to_string());
        second.has_partnerships = Some(true);
        let merged = store.merge_profile("s", second).await.unwrap();

        assert_eq!(merged.sector.len(), 2);
        assert_eq!(merged.has_partnerships, Some(true));
    }

    #[tokio::test]
    async fn test_lock_is_shared_per_session() {
        let store = InMemoryConversationStore::default();
        let a = store.lock("s").await;
        let b = store.lock("s").await;
        let other = store.lock("t").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));

        let _guard = a.lock().await;
        assert!(b.try_lock().is_err());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let store = InMemoryConversationStore::new(60);
        store.context("old").await.unwrap();
        store.context("fresh").await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(store.evict_idle(later), 2);
        assert_eq!(store.session_count(), 0);

        store.context("fresh").await.unwrap();
        assert_eq!(store.evict_idle(Utc::now()), 0);
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_locked_session_survives_sweep() {
        let store = InMemoryConversationStore::new(60);
        let guard = store.lock("busy").await.lock_owned().await;

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(store.evict_idle(later), 0);
        assert_eq!(store.session_count(), 1);

        drop(guard);
        assert_eq!(store.evict_idle(later), 1);
        assert_eq!(store.session_count(), 0);
    }
}
