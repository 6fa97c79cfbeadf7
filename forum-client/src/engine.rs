use std::{future::Future, sync::Arc, time::Duration};

use forum_api::{
    validate_text, Comment, CommentId, DocStore, Reply, ReplyId, ReplyRef, SortMode, StoreEvent,
    SubjectId, VoteAction, VoteOutcome,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{ops, Actor, EngineConfig, Error, IdentityResolver, RenderView, Result};

#[derive(Clone, Debug)]
pub enum EngineEvent {
    ViewUpdated(Arc<RenderView>),
    FeedError(String),
}

/// Snapshots delivered by the store for the engine's collection
pub struct SnapshotFeed(mpsc::UnboundedReceiver<StoreEvent>);

impl SnapshotFeed {
    pub async fn next(&mut self) -> Option<StoreEvent> {
        self.0.recv().await
    }

    /// Applies every event already delivered, without waiting for more, and
    /// returns how many there were
    pub fn drain<S: DocStore + ?Sized>(&mut self, engine: &CommentEngine<S>) -> usize {
        let mut applied = 0;
        while let Ok(e) = self.0.try_recv() {
            engine.apply_event(e);
            applied += 1;
        }
        applied
    }
}

struct State {
    comments: Arc<Vec<Arc<Comment>>>,
    sort: SortMode,
    view: Arc<RenderView>,
}

/// Local mirror of the comment collection, plus the actions one user can
/// take on it.
///
/// Actions only ever write to the store. The cache changes exclusively when a
/// snapshot gets applied, so an action shows up locally once the store has
/// broadcast it back.
pub struct CommentEngine<S: ?Sized> {
    config: EngineConfig,
    identity: IdentityResolver,
    state: Mutex<State>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<EngineEvent>>>,
    store: Arc<S>,
}

async fn with_timeout<T, F>(timeout: Option<Duration>, f: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        None => f.await,
        Some(d) => tokio::time::timeout(d, f)
            .await
            .map_err(|_| Error::Timeout(d))?,
    }
}

impl<S: DocStore + ?Sized> CommentEngine<S> {
    /// Subscribes to the configured collection. The returned feed must be
    /// driven, through [`SnapshotFeed::drain`] or [`CommentEngine::run`], for
    /// anything to show up.
    pub async fn init(
        store: Arc<S>,
        identity: IdentityResolver,
        config: EngineConfig,
    ) -> Result<(CommentEngine<S>, SnapshotFeed)> {
        let feed = with_timeout(config.store_timeout(), async {
            Ok(store.subscribe(&config.collection).await?)
        })
        .await?;
        tracing::debug!(collection = %config.collection, "subscribed to comment collection");
        let sort = SortMode::default();
        let engine = CommentEngine {
            state: Mutex::new(State {
                comments: Arc::new(Vec::new()),
                sort,
                view: Arc::new(RenderView::empty(sort)),
            }),
            listeners: Mutex::new(Vec::new()),
            config,
            identity,
            store,
        };
        Ok((engine, SnapshotFeed(feed)))
    }

    /// Receives an event for every change of the rendered view
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners.lock().push(sender);
        receiver
    }

    fn relay_event(&self, e: EngineEvent) {
        self.listeners
            .lock()
            .retain_mut(|l| matches!(l.send(e.clone()), Ok(())));
    }

    pub fn view(&self) -> Arc<RenderView> {
        self.state.lock().view.clone()
    }

    pub fn sort_mode(&self) -> SortMode {
        self.state.lock().sort
    }

    pub fn set_sort_mode(&self, sort: SortMode) {
        let viewer = self.identity.subject_id();
        let view = {
            let mut state = self.state.lock();
            state.sort = sort;
            state.view = Arc::new(RenderView::build(&state.comments, sort, viewer.as_ref()));
            state.view.clone()
        };
        self.relay_event(EngineEvent::ViewUpdated(view));
    }

    /// Re-renders for whoever is now signed in
    pub fn identity_changed(&self) {
        let sort = self.sort_mode();
        self.set_sort_mode(sort);
    }

    /// Replaces the whole cache with a delivered snapshot. This is the only
    /// place the cache gets modified.
    pub fn apply_event(&self, e: StoreEvent) {
        match e {
            StoreEvent::Snapshot(docs) => {
                let comments = docs
                    .iter()
                    .filter_map(|d| match Comment::from_document(d) {
                        Ok(c) => Some(Arc::new(c)),
                        Err(err) => {
                            tracing::warn!(?err, id = %d.id, "skipping undecodable comment");
                            None
                        }
                    })
                    .collect::<Vec<_>>();
                tracing::debug!(
                    num_docs = docs.len(),
                    num_comments = comments.len(),
                    "applying snapshot"
                );
                let viewer = self.identity.subject_id();
                let view = {
                    let mut state = self.state.lock();
                    state.comments = Arc::new(comments);
                    state.view = Arc::new(RenderView::build(
                        &state.comments,
                        state.sort,
                        viewer.as_ref(),
                    ));
                    state.view.clone()
                };
                self.relay_event(EngineEvent::ViewUpdated(view));
            }
            StoreEvent::Error(err) => {
                tracing::error!(%err, "comment feed error");
                self.relay_event(EngineEvent::FeedError(err));
            }
        }
    }

    /// Drives the feed until the store closes it, re-rendering on identity
    /// changes along the way
    pub async fn run(&self, mut feed: SnapshotFeed) {
        let mut identity_changes = self.identity.identity_changes();
        let mut identity_open = true;
        loop {
            tokio::select! {
                e = feed.next() => match e {
                    Some(e) => self.apply_event(e),
                    None => {
                        tracing::info!("comment feed closed");
                        return;
                    }
                },
                s = identity_changes.recv(), if identity_open => match s {
                    Some(s) => {
                        tracing::debug!(subject = ?s.as_ref().map(|s| &s.id), "identity changed");
                        self.identity_changed();
                    }
                    None => identity_open = false,
                },
            }
        }
    }

    fn actor(&self, text: &str, label: Option<&str>) -> Result<Actor> {
        validate_text(text)?;
        self.identity.actor(label)
    }

    fn subject(&self) -> Option<SubjectId> {
        self.identity.subject_id()
    }

    /// `label` is the name an anonymous user typed, if any
    pub async fn post_comment(&self, text: &str, label: Option<&str>) -> Result<CommentId> {
        let actor = self.actor(text, label)?;
        with_timeout(
            self.config.store_timeout(),
            ops::post_comment(
                &*self.store,
                &self.config.collection,
                &actor.id,
                &actor.username,
                text,
            ),
        )
        .await
    }

    pub async fn post_reply(
        &self,
        comment: &CommentId,
        target: Option<ReplyRef>,
        text: &str,
        label: Option<&str>,
    ) -> Result<ReplyId> {
        let actor = self.actor(text, label)?;
        with_timeout(
            self.config.store_timeout(),
            ops::post_reply(
                &*self.store,
                &self.config.collection,
                comment,
                target,
                &actor.id,
                &actor.username,
                text,
                self.config.reply_append,
            ),
        )
        .await
    }

    pub async fn vote(
        &self,
        comment: &CommentId,
        reply: Option<ReplyRef>,
        action: VoteAction,
    ) -> Result<VoteOutcome> {
        let subject = self.subject();
        with_timeout(
            self.config.store_timeout(),
            ops::vote(
                &*self.store,
                &self.config.collection,
                comment,
                reply,
                subject.as_ref(),
                action,
            ),
        )
        .await
    }

    pub async fn delete_comment(&self, comment: &CommentId) -> Result<()> {
        let subject = self.subject();
        with_timeout(
            self.config.store_timeout(),
            ops::delete_comment(
                &*self.store,
                &self.config.collection,
                comment,
                subject.as_ref(),
            ),
        )
        .await
    }

    pub async fn delete_reply(&self, comment: &CommentId, reply: ReplyRef) -> Result<Reply> {
        let subject = self.subject();
        with_timeout(
            self.config.store_timeout(),
            ops::delete_reply(
                &*self.store,
                &self.config.collection,
                comment,
                reply,
                subject.as_ref(),
            ),
        )
        .await
    }
}
