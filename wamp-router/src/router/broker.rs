use anyhow::Result;
use log::debug;

use crate::{
    core::{
        error::InteractionError,
        hash::{
            HashMap,
            IndexMap,
            IndexSet,
        },
        id::{
            Id,
            IdScope,
            ScopedIdGenerator,
        },
        match_style::MatchStyle,
        options::PublishOptions,
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::{
            Uri,
            WildcardUri,
        },
    },
    message::message::{
        EventMessage,
        Message,
    },
    router::{
        realm::RealmSession,
        snapshot::SubscriptionSnapshot,
    },
};

/// A topic pattern and the sessions subscribed to it.
#[derive(Debug)]
pub(crate) struct Subscription {
    pub id: Id,
    pub topic: WildcardUri,
    pub match_style: MatchStyle,
    /// Subscribers, in order of subscription.
    pub subscribers: IndexSet<Id>,
}

/// Subscription table of a realm.
#[derive(Debug, Default)]
pub(crate) struct Broker {
    /// Subscriptions, in order of creation.
    subscriptions: IndexMap<Id, Subscription>,
    by_pattern: HashMap<(WildcardUri, MatchStyle), Id>,
    by_session: HashMap<Id, IndexSet<Id>>,
}

impl Broker {
    /// Adds the session to the subscription for the pattern, creating it if needed.
    ///
    /// Subscribing twice to the same pattern and match style yields the same subscription.
    pub fn subscribe(
        &mut self,
        ids: &ScopedIdGenerator,
        session: Id,
        topic: WildcardUri,
        match_style: MatchStyle,
    ) -> Id {
        let key = (topic, match_style);
        let id = match self.by_pattern.get(&key) {
            Some(id) => *id,
            None => {
                let id = ids.next_id(IdScope::Subscription);
                self.subscriptions.insert(
                    id,
                    Subscription {
                        id,
                        topic: key.0.clone(),
                        match_style,
                        subscribers: IndexSet::default(),
                    },
                );
                self.by_pattern.insert(key, id);
                id
            }
        };
        if let Some(subscription) = self.subscriptions.get_mut(&id) {
            subscription.subscribers.insert(session);
        }
        self.by_session.entry(session).or_default().insert(id);
        id
    }

    /// Removes the session from the subscription.
    pub fn unsubscribe(&mut self, session: Id, subscription: Id) -> Result<()> {
        let entry = self
            .subscriptions
            .get_mut(&subscription)
            .filter(|entry| entry.subscribers.contains(&session))
            .ok_or(InteractionError::NoSuchSubscription)?;
        entry.subscribers.shift_remove(&session);
        if entry.subscribers.is_empty() {
            self.remove_subscription(subscription);
        }
        if let Some(subscriptions) = self.by_session.get_mut(&session) {
            subscriptions.shift_remove(&subscription);
            if subscriptions.is_empty() {
                self.by_session.remove(&session);
            }
        }
        Ok(())
    }

    fn remove_subscription(&mut self, id: Id) {
        if let Some(subscription) = self.subscriptions.shift_remove(&id) {
            debug!(
                "Subscription {id} to {} is empty and was removed",
                subscription.topic
            );
            self.by_pattern
                .remove(&(subscription.topic, subscription.match_style));
        }
    }

    /// Removes every subscription of the session.
    ///
    /// Returns the number of subscriptions the session left.
    pub fn remove_session(&mut self, session: Id) -> usize {
        let subscriptions = match self.by_session.remove(&session) {
            Some(subscriptions) => subscriptions,
            None => return 0,
        };
        let count = subscriptions.len();
        for id in subscriptions {
            let empty = match self.subscriptions.get_mut(&id) {
                Some(subscription) => {
                    subscription.subscribers.shift_remove(&session);
                    subscription.subscribers.is_empty()
                }
                None => false,
            };
            if empty {
                self.remove_subscription(id);
            }
        }
        count
    }

    /// Subscriptions matching a published topic, in order of creation.
    pub fn matching<'a>(&'a self, topic: &'a Uri) -> impl Iterator<Item = &'a Subscription> {
        self.subscriptions
            .values()
            .filter(move |subscription| subscription.topic.matches(topic, subscription.match_style))
    }

    /// Delivers EVENT to every eligible subscriber of subscriptions matching the topic.
    ///
    /// Returns the number of events queued.
    #[allow(clippy::too_many_arguments)]
    pub async fn publish(
        &self,
        sessions: &IndexMap<Id, RealmSession>,
        publisher: Id,
        publication: Id,
        topic: &Uri,
        options: &PublishOptions,
        arguments: &List,
        arguments_keyword: &Dictionary,
    ) -> usize {
        let mut delivered = 0;
        for subscription in self.matching(topic) {
            let mut details = Dictionary::default();
            if subscription.match_style != MatchStyle::Exact {
                details.insert("topic".to_owned(), Value::String(topic.to_string()));
            }
            if options.disclose_me {
                details.insert("publisher".to_owned(), Value::Integer(publisher.value()));
            }
            for subscriber in &subscription.subscribers {
                if *subscriber == publisher && options.exclude_me {
                    continue;
                }
                let session = match sessions.get(subscriber) {
                    Some(session) if !session.closing => session,
                    _ => continue,
                };
                if !options.allows(*subscriber, &session.identity.id, &session.identity.role) {
                    continue;
                }
                session
                    .session
                    .sink()
                    .send(Message::Event(EventMessage {
                        subscribed_subscription: subscription.id,
                        published_publication: publication,
                        details: details.clone(),
                        publish_arguments: arguments.clone(),
                        publish_arguments_keyword: arguments_keyword.clone(),
                    }))
                    .await;
                delivered += 1;
            }
        }
        delivered
    }

    pub fn snapshot(&self) -> Vec<SubscriptionSnapshot> {
        self.subscriptions
            .values()
            .map(|subscription| SubscriptionSnapshot {
                id: subscription.id,
                topic: subscription.topic.clone(),
                match_style: subscription.match_style,
                subscribers: subscription.subscribers.iter().cloned().collect(),
            })
            .collect()
    }
}
