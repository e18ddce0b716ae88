//! Request/response calls over a fire-and-forget message boundary.
//!
//! [`AsyncChannel::call`] tags each message with a fresh correlation id and
//! parks a resolver under that id. The [`ChannelDriver`] owns the transport:
//! it forwards outgoing envelopes to the worker and settles resolvers as
//! replies come back, in whatever order they arrive. When the transport goes
//! away every outstanding call fails with [`PlannerError::ChannelClosed`].

use crate::error::PlannerError;
use crate::protocol::{MessageId, Outcome, ReplyEnvelope, RequestEnvelope};
use futures::channel::{mpsc, oneshot};
use futures::future::{self, Either};
use futures::{pin_mut, Future, Sink, Stream, StreamExt};
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

type Resolver<R> = oneshot::Sender<Result<R, PlannerError>>;

/// Correlated request table: message id -> pending resolver.
struct Correlations<R> {
    next_id: MessageId,
    pending: HashMap<MessageId, Resolver<R>>,
    closed: bool,
}

impl<R> Correlations<R> {
    fn register(&mut self, resolver: Resolver<R>) -> Result<MessageId, PlannerError> {
        if self.closed {
            return Err(PlannerError::ChannelClosed);
        }
        let id = self.next_id;
        self.next_id += 1;
        let previous = self.pending.insert(id, resolver);
        debug_assert!(previous.is_none(), "correlation id {id} reused");
        Ok(id)
    }

    fn settle(&mut self, reply: ReplyEnvelope<R>) {
        let Some(resolver) = self.pending.remove(&reply.id) else {
            warn!("Dropping reply {} with no pending request", reply.id);
            return;
        };
        let result = match reply.outcome {
            Outcome::Reply(value) => Ok(value),
            Outcome::Error(message) => Err(PlannerError::Remote(message)),
        };
        // The caller may have discarded its future; that is fine.
        let _ = resolver.send(result);
    }

    fn close(&mut self) {
        self.closed = true;
        if !self.pending.is_empty() {
            warn!(
                "Channel closed with {} request(s) outstanding",
                self.pending.len()
            );
        }
        for (_, resolver) in self.pending.drain() {
            let _ = resolver.send(Err(PlannerError::ChannelClosed));
        }
    }
}

/// Caller side of the channel. Cheap to clone; all clones share one table.
pub struct AsyncChannel<M, R> {
    outbound: mpsc::UnboundedSender<RequestEnvelope<M>>,
    table: Rc<RefCell<Correlations<R>>>,
}

impl<M, R> Clone for AsyncChannel<M, R> {
    fn clone(&self) -> Self {
        AsyncChannel {
            outbound: self.outbound.clone(),
            table: Rc::clone(&self.table),
        }
    }
}

/// Transport side of the channel; run it with [`ChannelDriver::run`].
pub struct ChannelDriver<M, R> {
    outbound: mpsc::UnboundedReceiver<RequestEnvelope<M>>,
    table: Rc<RefCell<Correlations<R>>>,
}

/// Create a connected channel/driver pair.
pub fn channel<M, R>() -> (AsyncChannel<M, R>, ChannelDriver<M, R>) {
    let (tx, rx) = mpsc::unbounded();
    let table = Rc::new(RefCell::new(Correlations {
        next_id: 0,
        pending: HashMap::new(),
        closed: false,
    }));
    (
        AsyncChannel {
            outbound: tx,
            table: Rc::clone(&table),
        },
        ChannelDriver {
            outbound: rx,
            table,
        },
    )
}

impl<M, R> AsyncChannel<M, R>
where
    R: 'static,
{
    /// Send `message` and wait for its own reply.
    ///
    /// The message is transmitted immediately; the returned future only
    /// waits. Dropping the future does not cancel the work on the other side.
    pub fn call(&self, message: M) -> impl Future<Output = Result<R, PlannerError>> + 'static {
        let (resolver, reply) = oneshot::channel();
        let registered = self.table.borrow_mut().register(resolver);
        let sent = registered.and_then(|id| {
            self.outbound
                .unbounded_send(RequestEnvelope { id, message })
                .map_err(|_| {
                    self.table.borrow_mut().pending.remove(&id);
                    PlannerError::ChannelClosed
                })
        });

        async move {
            sent?;
            // A dropped resolver means the table was torn down.
            reply.await.unwrap_or(Err(PlannerError::ChannelClosed))
        }
    }

    /// Number of calls still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.table.borrow().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.table.borrow().closed
    }
}

impl<M, R> ChannelDriver<M, R> {
    /// Pump requests into `sink` and settle calls from `replies` until the
    /// transport ends. Rejects whatever is still pending on the way out.
    pub async fn run<Si, St>(self, sink: Si, replies: St)
    where
        Si: Sink<RequestEnvelope<M>> + Unpin,
        St: Stream<Item = ReplyEnvelope<R>> + Unpin,
    {
        let ChannelDriver { outbound, table } = self;

        let forward = outbound.map(Ok).forward(sink);
        let dispatch = {
            let table = Rc::clone(&table);
            replies.for_each(move |reply| {
                table.borrow_mut().settle(reply);
                future::ready(())
            })
        };
        pin_mut!(forward, dispatch);

        match future::select(forward, dispatch).await {
            Either::Left((Ok(()), dispatch)) => {
                // Every caller handle is gone; drain replies still owed.
                if !table.borrow().pending.is_empty() {
                    dispatch.await;
                }
                debug!("Channel handles dropped, stopping driver");
            }
            Either::Left((Err(_), _)) => warn!("Worker rejected an outgoing request"),
            Either::Right(((), _)) => debug!("Worker reply stream ended"),
        }

        table.borrow_mut().close();
    }
}
