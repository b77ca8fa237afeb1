/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! In-process fan-out broker.
//!
//! A single dispatcher task owns the subscriber table and serializes all
//! mutation through a command channel, so subscribe, unsubscribe, and
//! broadcast never contend on a lock. Each subscriber gets a bounded
//! buffer; a subscriber that falls behind loses messages rather than
//! stalling the dispatcher or its peers.

use eitri_utils::logging::prelude::*;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Per-subscriber buffer depth. A full buffer drops the message for that
/// subscriber only.
const SUBSCRIPTION_BUFFER: usize = 32;

/// Returned by [`Broker::subscribe`] when the dispatcher has stopped.
#[derive(Debug, Error)]
#[error("broker is no longer accepting subscriptions")]
pub struct SubscriptionUnavailable;

enum Command<T> {
    Subscribe(oneshot::Sender<(u64, mpsc::Receiver<Option<T>>)>),
    Unsubscribe(u64),
    Broadcast(T),
    Count(oneshot::Sender<usize>),
    Stop,
}

/// Handle to the dispatcher. Cheap to clone; all clones feed the same
/// subscriber table.
pub struct Broker<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Clone for Broker<T> {
    fn clone(&self) -> Self {
        Broker {
            commands: self.commands.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Broker<T> {
    /// Spawns the dispatcher task and returns a handle to it.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(rx));
        Broker { commands: tx }
    }

    /// Registers a new subscriber and returns its receiving half.
    pub async fn subscribe(&self) -> Result<Subscription<T>, SubscriptionUnavailable> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Subscribe(reply_tx))
            .map_err(|_| SubscriptionUnavailable)?;
        let (id, rx) = reply_rx.await.map_err(|_| SubscriptionUnavailable)?;
        Ok(Subscription {
            id,
            rx,
            commands: self.commands.clone(),
        })
    }

    /// Delivers `message` to every current subscriber. Fire-and-forget; a
    /// stopped broker silently discards the message.
    pub fn broadcast(&self, message: T) {
        let _ = self.commands.send(Command::Broadcast(message));
    }

    /// Number of live subscriptions, or zero once the dispatcher has
    /// stopped.
    pub async fn count(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Count(reply_tx)).is_err() {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }

    /// Shuts the dispatcher down. Every subscriber receives an end-of-stream
    /// marker and subsequent subscribe calls fail.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }
}

async fn dispatch<T: Clone + Send + 'static>(mut rx: mpsc::UnboundedReceiver<Command<T>>) {
    let mut next_id: u64 = 0;
    let mut subscribers: HashMap<u64, mpsc::Sender<Option<T>>> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Subscribe(reply) => {
                let id = next_id;
                next_id += 1;
                let (tx, sub_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
                if reply.send((id, sub_rx)).is_ok() {
                    subscribers.insert(id, tx);
                    debug!("subscriber {} registered ({} active)", id, subscribers.len());
                }
            }
            Command::Unsubscribe(id) => {
                if subscribers.remove(&id).is_some() {
                    debug!("subscriber {} removed ({} active)", id, subscribers.len());
                }
            }
            Command::Broadcast(message) => {
                let mut closed = Vec::new();
                for (id, tx) in &subscribers {
                    match tx.try_send(Some(message.clone())) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!("subscriber {} buffer full, dropping message", id);
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            closed.push(*id);
                        }
                    }
                }
                for id in closed {
                    subscribers.remove(&id);
                    debug!("subscriber {} pruned ({} active)", id, subscribers.len());
                }
            }
            Command::Count(reply) => {
                let _ = reply.send(subscribers.len());
            }
            Command::Stop => {
                for (_, tx) in subscribers.drain() {
                    let _ = tx.try_send(None);
                }
                break;
            }
        }
    }
}

/// The receiving half of a subscription. Dropping it unregisters the
/// subscriber.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::Receiver<Option<T>>,
    commands: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Subscription<T> {
    /// Waits for the next broadcast message. Returns `None` once the broker
    /// has stopped or this subscription has been pruned.
    pub async fn recv(&mut self) -> Option<T> {
        match self.rx.recv().await {
            Some(Some(message)) => Some(message),
            // Either the stop marker or a closed channel ends the stream.
            Some(None) | None => None,
        }
    }

    /// Explicitly unregisters this subscription. Dropping it has the same
    /// effect; unsubscribing twice is harmless.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe(self.id));
    }
}
