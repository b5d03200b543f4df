use super::snapshot::{ConversationSnapshot, StoredConversation};
use crate::scope::ScopeCache;
use chatstudy_core::clock::Clock;
use chatstudy_core::config::SyncSettings;
use chatstudy_core::conversation::{Conversation, ConversationGateway, Message, Sender};
use chatstudy_core::error::{Result, StudyError};
use chatstudy_core::scope::EntityKind;
use chatstudy_core::sync::{
    DebounceScheduler, MergedEntry, SyncEvent, SyncState, merge_conversation, merge_lists,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Result of a flush: which conversations were saved and which failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub saved: Vec<String>,
    pub failed: Vec<String>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty() && self.failed.is_empty()
    }
}

/// Result of [`ConversationSynchronizer::load_history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// The loaded set, most recently active first.
    pub conversations: Vec<Conversation>,
    /// `false` if the remote store could not be reached and the list is
    /// the local view only.
    pub remote_available: bool,
}

/// Result of [`ConversationSynchronizer::delete_conversation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// `true` once the remote store is known not to hold the conversation.
    /// When `false`, the deletion is retried on the next history load.
    pub remote_deleted: bool,
}

struct Entry {
    principal_id: String,
    conversation: Conversation,
    state: SyncState,
    /// Bumped on every local change. A save only marks the entry synced
    /// if the revision it carried is still current when it completes.
    revision: u64,
}

impl Entry {
    /// True if the entry became synced after `baseline` was taken, i.e. it
    /// was not synced at that revision back then.
    fn synced_since(&self, baseline: Option<u64>) -> bool {
        self.state == SyncState::Synced && baseline != Some(self.revision)
    }
}

struct PendingSave {
    principal_id: String,
    conversation: Conversation,
    revision: u64,
}

struct SyncInner {
    /// conversation id → entry
    entries: HashMap<String, Entry>,
    scheduler: DebounceScheduler,
    /// conversation id → principal id
    pending_deletes: HashMap<String, String>,
}

impl SyncInner {
    fn snapshot(&self, principal_id: &str) -> ConversationSnapshot {
        let mut entries: Vec<StoredConversation> = self
            .entries
            .values()
            .filter(|e| e.principal_id == principal_id)
            .map(|e| StoredConversation {
                conversation: e.conversation.clone(),
                state: e.state,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.conversation
                .last_activity_at
                .cmp(&a.conversation.last_activity_at)
        });

        let mut pending_deletes: Vec<String> = self
            .pending_deletes
            .iter()
            .filter(|(_, owner)| owner.as_str() == principal_id)
            .map(|(id, _)| id.clone())
            .collect();
        pending_deletes.sort();

        ConversationSnapshot {
            entries,
            pending_deletes,
        }
    }

    /// conversation id → revision, for every synced entry of `principal_id`.
    fn synced_revisions(&self, principal_id: &str) -> HashMap<String, u64> {
        self.entries
            .iter()
            .filter(|(_, e)| e.principal_id == principal_id && e.state == SyncState::Synced)
            .map(|(id, e)| (id.clone(), e.revision))
            .collect()
    }

    fn visible(&self, principal_id: &str, include_local_only: bool) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self
            .entries
            .values()
            .filter(|e| e.principal_id == principal_id)
            .filter(|e| include_local_only || e.state != SyncState::LocalOnly)
            .map(|e| e.conversation.clone())
            .collect();
        list.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        list
    }
}

fn entry_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    principal_id: &str,
    conversation_id: &str,
) -> Result<&'a mut Entry> {
    match entries.get_mut(conversation_id) {
        Some(entry) if entry.principal_id == principal_id => Ok(entry),
        _ => Err(StudyError::not_found("conversation", conversation_id)),
    }
}

/// Feeds a local change into the state machine and (re-)arms the debounce
/// timer if the conversation now has something to save.
fn apply_change(entry: &mut Entry, scheduler: &mut DebounceScheduler, now: DateTime<Utc>) {
    entry.revision += 1;
    entry.state = entry.state.on(SyncEvent::Changed {
        persistable: entry.conversation.meets_persistence_threshold(),
    });
    if entry.state.has_unsaved_changes() {
        let deadline = scheduler.arm_at(&entry.conversation.id, now);
        entry.state = entry.state.on(SyncEvent::DebounceArmed);
        tracing::debug!(
            "[ConversationSync] {} armed until {}",
            entry.conversation.id,
            deadline
        );
    }
}

fn clamp_activity(conversation: &mut Conversation) {
    if conversation.last_activity_at < conversation.created_at {
        conversation.last_activity_at = conversation.created_at;
    }
}

/// Keeps the local conversation view and the remote store in step.
///
/// Every mutation is applied to the in-memory view first and written
/// through to the [`ScopeCache`]. Remote writes are debounced per
/// conversation: a burst of changes produces a single `save` carrying the
/// full message list once the conversation has been quiet for the
/// configured interval. Debounce deadlines are evaluated by
/// [`flush_due`](Self::flush_due), either from a test or from the
/// background driver started by
/// [`spawn_debounce_driver`](Self::spawn_debounce_driver).
///
/// Remote failures never propagate. A failed save leaves the conversation
/// pending until its next change, and a failed delete is retried on the
/// next history load.
pub struct ConversationSynchronizer {
    gateway: Arc<dyn ConversationGateway>,
    scope: Arc<ScopeCache>,
    clock: Arc<dyn Clock>,
    inner: Mutex<SyncInner>,
}

impl ConversationSynchronizer {
    pub fn new(
        gateway: Arc<dyn ConversationGateway>,
        scope: Arc<ScopeCache>,
        clock: Arc<dyn Clock>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            gateway,
            scope,
            clock,
            inner: Mutex::new(SyncInner {
                entries: HashMap::new(),
                scheduler: DebounceScheduler::new(settings.debounce()),
                pending_deletes: HashMap::new(),
            }),
        }
    }

    fn persist_local(&self, inner: &SyncInner, principal_id: &str) {
        let snapshot = inner.snapshot(principal_id);
        if !self
            .scope
            .write(principal_id, EntityKind::Conversations, &snapshot)
        {
            tracing::debug!(
                "[ConversationSync] Local view for {} held in memory only",
                principal_id
            );
        }
    }

    /// Starts a new conversation, optionally opening with an assistant
    /// greeting. The conversation stays local until a participant writes.
    pub async fn create_conversation(
        &self,
        principal_id: &str,
        title: &str,
        model: &str,
        greeting: Option<&str>,
    ) -> Conversation {
        let now = self.clock.now();
        let mut conversation = Conversation::new(principal_id, title, model, now);
        if let Some(greeting) = greeting {
            conversation.append(Message::new(Sender::Assistant, greeting, now));
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let mut entry = Entry {
            principal_id: principal_id.to_string(),
            conversation: conversation.clone(),
            state: SyncState::LocalOnly,
            revision: 0,
        };
        apply_change(&mut entry, &mut inner.scheduler, now);
        inner.entries.insert(conversation.id.clone(), entry);
        self.persist_local(inner, principal_id);

        tracing::debug!(
            "[ConversationSync] Created {} for {}",
            conversation.id,
            principal_id
        );
        conversation
    }

    /// Appends a message and schedules a save.
    pub async fn append_message(
        &self,
        principal_id: &str,
        conversation_id: &str,
        sender: Sender,
        text: &str,
    ) -> Result<Message> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = self.clock.now();

        let entry = entry_mut(&mut inner.entries, principal_id, conversation_id)?;
        let message = Message::new(sender, text, now);
        entry.conversation.append(message.clone());
        apply_change(entry, &mut inner.scheduler, now);

        self.persist_local(inner, principal_id);
        Ok(message)
    }

    /// Renames a conversation. Counts as a change for sync purposes.
    pub async fn rename_conversation(
        &self,
        principal_id: &str,
        conversation_id: &str,
        title: &str,
    ) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = self.clock.now();

        let entry = entry_mut(&mut inner.entries, principal_id, conversation_id)?;
        if entry.conversation.title == title {
            return Ok(());
        }
        entry.conversation.title = title.to_string();
        apply_change(entry, &mut inner.scheduler, now);

        self.persist_local(inner, principal_id);
        Ok(())
    }

    /// Saves every conversation whose debounce deadline has passed.
    pub async fn flush_due(&self) -> FlushReport {
        let batch = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let due = inner.scheduler.take_due(self.clock.now());

            let mut batch = Vec::with_capacity(due.len());
            for id in due {
                match inner.entries.get(&id) {
                    Some(entry) if entry.state.has_unsaved_changes() => batch.push(PendingSave {
                        principal_id: entry.principal_id.clone(),
                        conversation: entry.conversation.clone(),
                        revision: entry.revision,
                    }),
                    _ => inner.scheduler.finish(&id),
                }
            }
            batch
        };

        let mut report = FlushReport::default();
        for pending in batch {
            self.save_one(pending, &mut report).await;
        }
        report
    }

    async fn save_one(&self, pending: PendingSave, report: &mut FlushReport) {
        let id = pending.conversation.id.clone();
        let result = self
            .gateway
            .save(&pending.principal_id, &pending.conversation)
            .await;

        let delete_after = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            inner.scheduler.finish(&id);

            match &result {
                Ok(()) => {
                    if let Some(entry) = inner.entries.get_mut(&id) {
                        if entry.revision == pending.revision {
                            entry.state = entry.state.on(SyncEvent::SaveSucceeded);
                        }
                    }
                    tracing::info!(
                        "[ConversationSync] Saved {} ({} messages)",
                        id,
                        pending.conversation.messages.len()
                    );
                    report.saved.push(id.clone());
                }
                Err(e) => {
                    if let Some(entry) = inner.entries.get_mut(&id) {
                        entry.state = entry.state.on(SyncEvent::SaveFailed);
                    }
                    tracing::warn!("[ConversationSync] Save of {} failed: {}", id, e);
                    report.failed.push(id.clone());
                }
            }

            self.persist_local(inner, &pending.principal_id);
            result.is_ok() && inner.pending_deletes.contains_key(&id)
        };

        // Deleted while the save was in flight; the save may have recreated it.
        if delete_after {
            self.delete_remote(&pending.principal_id, &id).await;
        }
    }

    /// Forces an immediate save of every conversation of `principal_id`
    /// that has unsaved changes, including ones whose last save failed.
    pub async fn flush_all(&self, principal_id: &str) -> FlushReport {
        {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let now = self.clock.now();
            for (id, entry) in inner.entries.iter() {
                if entry.principal_id == principal_id
                    && entry.state.has_unsaved_changes()
                    && !inner.scheduler.is_in_flight(id)
                {
                    inner.scheduler.arm_now(id, now);
                }
            }
        }
        self.flush_due().await
    }

    /// Fetches the remote list for `principal_id` and merges it into the
    /// local view.
    ///
    /// Returns the loaded set: everything except conversations that never
    /// met the persistence threshold. If the remote store is unreachable,
    /// the local view is returned as is.
    pub async fn load_history(&self, principal_id: &str) -> LoadOutcome {
        let (retry, baseline) = {
            let guard = self.inner.lock().await;
            let retry: Vec<String> = guard
                .pending_deletes
                .iter()
                .filter(|(_, owner)| owner.as_str() == principal_id)
                .map(|(id, _)| id.clone())
                .collect();
            (retry, guard.synced_revisions(principal_id))
        };
        for id in retry {
            self.delete_remote(principal_id, &id).await;
        }

        let fetched = match self.gateway.fetch_all(principal_id).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(
                    "[ConversationSync] History for {} unavailable, using local view: {}",
                    principal_id,
                    e
                );
                let guard = self.inner.lock().await;
                return LoadOutcome {
                    conversations: guard.visible(principal_id, false),
                    remote_available: false,
                };
            }
        };

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = self.clock.now();

        // Entries acknowledged after the fetch started are newer than the
        // fetched list and are left out of the merge.
        let ids: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.principal_id == principal_id)
            .filter(|(id, e)| !e.synced_since(baseline.get(id.as_str()).copied()))
            .map(|(id, _)| id.clone())
            .collect();
        let mut revisions = HashMap::with_capacity(ids.len());
        let mut local = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = inner.entries.remove(&id) {
                revisions.insert(id, entry.revision);
                local.push(MergedEntry::new(entry.conversation, entry.state));
            }
        }

        let fetched: Vec<Conversation> = fetched
            .into_iter()
            .filter(|c| !inner.pending_deletes.contains_key(&c.id))
            .filter(|c| !inner.entries.contains_key(&c.id))
            .collect();

        let outcome = merge_lists(local, fetched);
        inner
            .scheduler
            .forget(outcome.dropped.iter().map(String::as_str));

        for merged in outcome.entries {
            let id = merged.conversation.id.clone();
            let mut state = merged.state;
            let mut revision = revisions.get(&id).copied().unwrap_or(0);
            if state.has_unsaved_changes() {
                // The merged content differs from whatever save may be in
                // flight, so that save must not mark the entry synced.
                revision += 1;
                if !inner.scheduler.is_armed(&id) {
                    inner.scheduler.arm_at(&id, now);
                }
                state = state.on(SyncEvent::DebounceArmed);
            }
            inner.entries.insert(
                id,
                Entry {
                    principal_id: principal_id.to_string(),
                    conversation: merged.conversation,
                    state,
                    revision,
                },
            );
        }

        let loaded = inner.visible(principal_id, false);
        tracing::info!(
            "[ConversationSync] Loaded {} conversations for {} ({} dropped)",
            loaded.len(),
            principal_id,
            outcome.dropped.len()
        );
        self.persist_local(inner, principal_id);

        LoadOutcome {
            conversations: loaded,
            remote_available: true,
        }
    }

    /// Returns one conversation, refreshing it from the remote store when
    /// the local copy has nothing unsaved.
    pub async fn open_conversation(
        &self,
        principal_id: &str,
        conversation_id: &str,
    ) -> Option<Conversation> {
        let local = {
            let guard = self.inner.lock().await;
            if guard.pending_deletes.contains_key(conversation_id) {
                return None;
            }
            match guard.entries.get(conversation_id) {
                Some(e) if e.principal_id != principal_id => return None,
                Some(e) if e.state != SyncState::Synced => return Some(e.conversation.clone()),
                Some(e) => Some((e.conversation.clone(), e.revision)),
                None => None,
            }
        };
        let baseline = local.as_ref().map(|(_, revision)| *revision);

        let fetched = match self.gateway.fetch_one(principal_id, conversation_id).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(
                    "[ConversationSync] Could not refresh {}: {}",
                    conversation_id,
                    e
                );
                return local.map(|(conversation, _)| conversation);
            }
        };

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = self.clock.now();

        let opened = match inner.entries.get_mut(conversation_id) {
            Some(entry) if entry.principal_id != principal_id => None,
            // Saved again while the fetch was in flight; the local copy is newer.
            Some(entry) if entry.synced_since(baseline) => Some(entry.conversation.clone()),
            Some(entry) => match fetched {
                Some(fetched) => {
                    let (merged, kept_local) =
                        merge_conversation(&entry.conversation, entry.state, fetched);
                    entry.conversation = merged;
                    if kept_local {
                        entry.revision += 1;
                        if !inner.scheduler.is_armed(conversation_id) {
                            inner.scheduler.arm_at(conversation_id, now);
                        }
                        entry.state = entry.state.on(SyncEvent::DebounceArmed);
                    } else {
                        entry.state = SyncState::Synced;
                    }
                    Some(entry.conversation.clone())
                }
                None if entry.state == SyncState::Synced => {
                    tracing::debug!(
                        "[ConversationSync] {} no longer exists remotely",
                        conversation_id
                    );
                    inner.entries.remove(conversation_id);
                    inner.scheduler.forget([conversation_id]);
                    None
                }
                None => Some(entry.conversation.clone()),
            },
            None => fetched
                .filter(|_| !inner.pending_deletes.contains_key(conversation_id))
                .map(|mut fetched| {
                    clamp_activity(&mut fetched);
                    inner.entries.insert(
                        fetched.id.clone(),
                        Entry {
                            principal_id: principal_id.to_string(),
                            conversation: fetched.clone(),
                            state: SyncState::Synced,
                            revision: 0,
                        },
                    );
                    fetched
                }),
        };

        self.persist_local(inner, principal_id);
        opened
    }

    /// Deletes a conversation locally and remotely.
    ///
    /// The local copy is gone when this returns. A conversation that was
    /// never persisted skips the remote call.
    pub async fn delete_conversation(
        &self,
        principal_id: &str,
        conversation_id: &str,
    ) -> Result<DeleteOutcome> {
        let state = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;

            let previous = entry_mut(&mut inner.entries, principal_id, conversation_id)?.state;
            inner.entries.remove(conversation_id);
            inner.scheduler.cancel(conversation_id);
            if previous != SyncState::LocalOnly {
                inner
                    .pending_deletes
                    .insert(conversation_id.to_string(), principal_id.to_string());
            }
            self.persist_local(inner, principal_id);
            previous
        };

        tracing::debug!(
            "[ConversationSync] Deleted {} locally (was {:?})",
            conversation_id,
            state
        );
        if state == SyncState::LocalOnly {
            return Ok(DeleteOutcome {
                remote_deleted: true,
            });
        }

        let remote_deleted = self.delete_remote(principal_id, conversation_id).await;
        Ok(DeleteOutcome { remote_deleted })
    }

    /// Sends a pending deletion to the remote store. Returns `true` once the
    /// deletion is confirmed and no save for the id is still in flight.
    async fn delete_remote(&self, principal_id: &str, conversation_id: &str) -> bool {
        if let Err(e) = self.gateway.delete(principal_id, conversation_id).await {
            tracing::warn!(
                "[ConversationSync] Remote delete of {} failed, will retry: {}",
                conversation_id,
                e
            );
            return false;
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.scheduler.is_in_flight(conversation_id) {
            return false;
        }
        if inner.pending_deletes.remove(conversation_id).is_some() {
            self.persist_local(inner, principal_id);
        }
        true
    }

    /// Rebuilds the in-memory view of `principal_id` from the scope cache,
    /// re-arming the debounce for conversations that still had unsaved
    /// changes. Returns how many conversations were restored.
    pub async fn restore(&self, principal_id: &str) -> usize {
        let Some(snapshot) = self
            .scope
            .read::<ConversationSnapshot>(principal_id, EntityKind::Conversations)
        else {
            return 0;
        };

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let now = self.clock.now();

        let mut restored = 0;
        for stored in snapshot.entries {
            let id = stored.conversation.id.clone();
            if stored.state == SyncState::Deleted || inner.entries.contains_key(&id) {
                continue;
            }
            let mut state = stored.state;
            if state.has_unsaved_changes() {
                inner.scheduler.arm_at(&id, now);
                state = state.on(SyncEvent::DebounceArmed);
            }
            inner.entries.insert(
                id,
                Entry {
                    principal_id: principal_id.to_string(),
                    conversation: stored.conversation,
                    state,
                    revision: 0,
                },
            );
            restored += 1;
        }
        for id in snapshot.pending_deletes {
            inner
                .pending_deletes
                .entry(id)
                .or_insert_with(|| principal_id.to_string());
        }

        tracing::debug!(
            "[ConversationSync] Restored {} conversations for {}",
            restored,
            principal_id
        );
        restored
    }

    /// Flushes and then drops the in-memory state of `principal_id`. The
    /// local cache keeps whatever could not be saved, for [`restore`].
    ///
    /// [`restore`]: Self::restore
    pub async fn release_principal(&self, principal_id: &str) -> FlushReport {
        let report = self.flush_all(principal_id).await;

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        self.persist_local(inner, principal_id);

        let ids: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.principal_id == principal_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            inner.entries.remove(id);
        }
        inner.scheduler.forget(ids.iter().map(String::as_str));
        inner
            .pending_deletes
            .retain(|_, owner| owner.as_str() != principal_id);

        tracing::debug!(
            "[ConversationSync] Released {} ({} conversations)",
            principal_id,
            ids.len()
        );
        report
    }

    /// The UI-visible list for `principal_id`, including conversations
    /// that are still local only. Most recently active first.
    pub async fn conversations(&self, principal_id: &str) -> Vec<Conversation> {
        self.inner.lock().await.visible(principal_id, true)
    }

    pub async fn sync_state(&self, conversation_id: &str) -> Option<SyncState> {
        self.inner
            .lock()
            .await
            .entries
            .get(conversation_id)
            .map(|e| e.state)
    }

    /// Spawns a task that calls [`flush_due`](Self::flush_due) every `tick`.
    /// Abort the returned handle to stop it.
    pub fn spawn_debounce_driver(self: &Arc<Self>, tick: std::time::Duration) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::debug!("[ConversationSync] Debounce driver started ({:?} tick)", tick);

            loop {
                ticker.tick().await;
                let report = sync.flush_due().await;
                if !report.failed.is_empty() {
                    tracing::debug!(
                        "[ConversationSync] {} saves failed this tick",
                        report.failed.len()
                    );
                }
            }
        })
    }
}
