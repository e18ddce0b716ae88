//! Background side of the planner: request handlers and the dispatch loop.
//!
//! A [`PlannerService`] owns the lazily built engine and the query cache. It
//! is constructed explicitly so tests can run independent instances; the
//! worker keeps one per thread.

use crate::config::STOP_SEARCH_MAX_RESULTS;
use crate::engine::{EngineSource, Query, RoutingResult, TransitEngine};
use crate::error::PlannerError;
use crate::protocol::{
    Arrival, Outcome, ReplyEnvelope, RequestEnvelope, SimpleStop, Time, WorkerReply, WorkerRequest,
};
use crate::query_cache::{QueryFingerprint, QueryResultCache};
use crate::single_flight::SingleFlight;
use futures::stream::FuturesUnordered;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;

pub struct PlannerService {
    source: Rc<dyn EngineSource>,
    engine: SingleFlight<Rc<dyn TransitEngine>, PlannerError>,
    results: RefCell<QueryResultCache<dyn RoutingResult>>,
}

impl PlannerService {
    pub fn new(source: Rc<dyn EngineSource>, cache_capacity: usize) -> Self {
        PlannerService {
            source,
            engine: SingleFlight::new(),
            results: RefCell::new(QueryResultCache::new(cache_capacity)),
        }
    }

    /// The shared engine, loading it on first use.
    pub async fn engine(&self) -> Result<Rc<dyn TransitEngine>, PlannerError> {
        self.engine.get_or_init(|| self.source.load()).await
    }

    pub fn cached_queries(&self) -> usize {
        self.results.borrow().len()
    }

    fn route_cached(
        &self,
        engine: &dyn TransitEngine,
        query: &Query,
    ) -> Result<Rc<dyn RoutingResult>, PlannerError> {
        let fingerprint = QueryFingerprint::of(query)?;
        self.results
            .borrow_mut()
            .get_or_compute(fingerprint, || engine.route(query))
    }

    pub async fn handle(&self, request: WorkerRequest) -> Result<WorkerReply, PlannerError> {
        match request {
            WorkerRequest::ArrivalsResolution {
                origin,
                departure_time,
                max_transfers,
                max_duration,
            } => {
                let engine = self.engine().await?;
                let departure = Time::from_seconds(departure_time);
                let query = Query::from(origin, departure, max_transfers);
                let result = self.route_cached(&*engine, &query)?;

                let mut arrivals: Vec<Arrival> = result
                    .earliest_arrivals()
                    .into_iter()
                    .filter_map(|(stop_id, reached)| {
                        let stop = engine.find_stop_by_id(stop_id)?;
                        let duration = reached.time.since(departure).to_seconds();
                        (duration < max_duration).then_some(Arrival {
                            position: [stop.lon?, stop.lat?],
                            duration,
                            transfers: reached.leg_number.saturating_sub(1),
                        })
                    })
                    .collect();
                arrivals.sort_by_key(|a| a.duration);
                Ok(WorkerReply::Arrivals { arrivals })
            }
            WorkerRequest::Routing {
                origin,
                destination,
                departure_time,
                max_transfers,
            } => {
                let engine = self.engine().await?;
                let query = Query::from(origin, Time::from_seconds(departure_time), max_transfers)
                    .to(destination.clone());
                let result = self.route_cached(&*engine, &query)?;
                Ok(WorkerReply::Route {
                    route: result.best_route(&destination),
                })
            }
            WorkerRequest::FindStopsByName { query, max_results } => {
                let engine = self.engine().await?;
                let stops = engine
                    .find_stops_by_name(&query, max_results.unwrap_or(STOP_SEARCH_MAX_RESULTS))
                    .iter()
                    .filter_map(SimpleStop::from_stop)
                    .collect();
                Ok(WorkerReply::Stops { stops })
            }
            WorkerRequest::FindStopById { stop_id } => {
                let engine = self.engine().await?;
                let stop = engine
                    .find_stop_by_source_id(&stop_id)
                    .as_ref()
                    .and_then(SimpleStop::from_stop);
                Ok(WorkerReply::Stop { stop })
            }
            WorkerRequest::FindStopsByLocation {
                lat,
                lon,
                max_results,
                radius,
            } => {
                let engine = self.engine().await?;
                let stops = engine
                    .find_stops_by_location(lat, lon, max_results, radius)
                    .iter()
                    .filter_map(SimpleStop::from_stop)
                    .collect();
                Ok(WorkerReply::Stops { stops })
            }
            WorkerRequest::ReleaseMemory => {
                let evicted = self.results.borrow_mut().relieve_pressure();
                info!("Released {} cached queries", evicted);
                Ok(WorkerReply::MemoryReleased { evicted })
            }
            WorkerRequest::Unknown => Err(PlannerError::UnsupportedRequest),
        }
    }

    /// Handle one envelope and wrap the outcome for the trip back.
    pub async fn respond(
        &self,
        envelope: RequestEnvelope<WorkerRequest>,
    ) -> ReplyEnvelope<WorkerReply> {
        let RequestEnvelope { id, message } = envelope;
        let kind = message.kind();
        debug!("Handling {} request {}", kind, id);
        let outcome = match self.handle(message).await {
            Ok(reply) => Outcome::Reply(reply),
            Err(err) => {
                warn!("{} request {} failed: {}", kind, id, err);
                Outcome::Error(err.to_string())
            }
        };
        ReplyEnvelope { id, outcome }
    }
}

/// Serve requests concurrently until the request stream ends or the reply
/// sink goes away. Replies are sent as soon as each one is ready.
pub async fn serve<St, Si>(service: &PlannerService, requests: St, mut replies: Si)
where
    St: Stream<Item = RequestEnvelope<WorkerRequest>> + Unpin,
    Si: Sink<ReplyEnvelope<WorkerReply>> + Unpin,
{
    let mut requests = requests.fuse();
    let mut in_flight = FuturesUnordered::new();
    loop {
        futures::select! {
            envelope = requests.next() => match envelope {
                Some(envelope) => in_flight.push(service.respond(envelope)),
                None => break,
            },
            reply = in_flight.select_next_some() => {
                if replies.send(reply).await.is_err() {
                    break;
                }
            }
        }
    }
    if !in_flight.is_empty() {
        debug!("Bridge gone, dropping {} unfinished request(s)", in_flight.len());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::engine::network::tests::sample_network;
    use futures::channel::oneshot;
    use futures::executor::{block_on, LocalPool};
    use futures::future::{self, LocalBoxFuture, Shared};
    use futures::FutureExt;
    use std::cell::Cell;

    /// Engine source over the sample network that counts loads and can be
    /// held back until released.
    pub(crate) struct FakeSource {
        pub loads: Cell<usize>,
        gate: Option<Shared<oneshot::Receiver<()>>>,
        fail_first: Cell<bool>,
    }

    impl FakeSource {
        pub(crate) fn ready() -> Rc<Self> {
            Rc::new(FakeSource {
                loads: Cell::new(0),
                gate: None,
                fail_first: Cell::new(false),
            })
        }

        pub(crate) fn gated() -> (Rc<Self>, oneshot::Sender<()>) {
            let (tx, rx) = oneshot::channel();
            let source = Rc::new(FakeSource {
                loads: Cell::new(0),
                gate: Some(rx.shared()),
                fail_first: Cell::new(false),
            });
            (source, tx)
        }

        pub(crate) fn failing_once() -> Rc<Self> {
            let source = Self::ready();
            source.fail_first.set(true);
            source
        }
    }

    impl EngineSource for FakeSource {
        fn load(&self) -> LocalBoxFuture<'static, Result<Rc<dyn TransitEngine>, PlannerError>> {
            self.loads.set(self.loads.get() + 1);
            let gate = self.gate.clone();
            let fail = self.fail_first.replace(false);
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                if fail {
                    return Err(PlannerError::Fetch {
                        url: "/timetable.bin.gz".into(),
                        reason: "HTTP 503".into(),
                    });
                }
                Ok(Rc::new(sample_network()) as Rc<dyn TransitEngine>)
            }
            .boxed_local()
        }
    }

    fn routing(destination: &str) -> WorkerRequest {
        WorkerRequest::Routing {
            origin: "PA".into(),
            destination: destination.into(),
            departure_time: 7 * 3600 + 55 * 60,
            max_transfers: 4,
        }
    }

    #[test]
    fn concurrent_requests_load_the_engine_once() {
        let (source, release) = FakeSource::gated();
        let service = PlannerService::new(source.clone(), 8);

        let mut pool = LocalPool::new();
        let replies = pool.run_until(async {
            let pending = future::join3(
                service.handle(routing("D")),
                service.handle(WorkerRequest::FindStopById {
                    stop_id: "B".into(),
                }),
                service.handle(WorkerRequest::FindStopsByName {
                    query: "mor".into(),
                    max_results: None,
                }),
            );
            let _ = release.send(());
            pending.await
        });

        assert_eq!(source.loads.get(), 1);
        assert!(matches!(replies.0, Ok(WorkerReply::Route { route: Some(_) })));
        match replies.1 {
            Ok(WorkerReply::Stop { stop: Some(stop) }) => assert_eq!(stop.name, "Renens VD"),
            other => panic!("unexpected reply {other:?}"),
        }
        match replies.2 {
            Ok(WorkerReply::Stops { stops }) => assert_eq!(stops[0].source_id, "C"),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn failed_initialization_is_retried() {
        let source = FakeSource::failing_once();
        let service = PlannerService::new(source.clone(), 8);

        let first = block_on(service.handle(routing("D")));
        assert!(matches!(first, Err(PlannerError::Fetch { .. })));

        let second = block_on(service.handle(routing("D")));
        assert!(second.is_ok());
        assert_eq!(source.loads.get(), 2);
    }

    #[test]
    fn repeated_queries_hit_the_cache() {
        let service = PlannerService::new(FakeSource::ready(), 8);
        block_on(service.handle(routing("D"))).unwrap();
        block_on(service.handle(routing("D"))).unwrap();
        assert_eq!(service.cached_queries(), 1);

        block_on(service.handle(routing("C"))).unwrap();
        assert_eq!(service.cached_queries(), 2);

        let released = block_on(service.handle(WorkerRequest::ReleaseMemory)).unwrap();
        assert_eq!(released, WorkerReply::MemoryReleased { evicted: 1 });
        assert_eq!(service.cached_queries(), 1);
    }

    #[test]
    fn arrivals_are_bounded_by_duration() {
        let service = PlannerService::new(FakeSource::ready(), 8);
        let reply = block_on(service.handle(WorkerRequest::ArrivalsResolution {
            origin: "PA".into(),
            departure_time: 7 * 3600 + 55 * 60,
            max_transfers: 5,
            max_duration: 30 * 60,
        }))
        .unwrap();

        let WorkerReply::Arrivals { arrivals } = reply else {
            panic!("expected arrivals");
        };
        // Geneva (55 min away) is cut off; the origin itself is 0 s away.
        assert_eq!(arrivals.first().map(|a| a.duration), Some(0));
        assert!(arrivals.iter().all(|a| a.duration < 30 * 60));
        assert!(arrivals.iter().any(|a| a.duration == 12 * 60 && a.transfers == 0));
        assert!(!arrivals.iter().any(|a| a.duration == 55 * 60));
    }

    #[test]
    fn engine_errors_are_serialized_per_request() {
        let service = PlannerService::new(FakeSource::ready(), 8);
        let reply = block_on(service.respond(RequestEnvelope {
            id: 3,
            message: WorkerRequest::Routing {
                origin: "ghost".into(),
                destination: "D".into(),
                departure_time: 0,
                max_transfers: 1,
            },
        }));
        assert_eq!(reply.id, 3);
        assert_eq!(reply.outcome, Outcome::Error("unknown stop: ghost".into()));
        assert_eq!(service.cached_queries(), 0);
    }

    #[test]
    fn unknown_request_types_still_get_a_reply() {
        let source = FakeSource::ready();
        let service = PlannerService::new(source.clone(), 8);
        let envelope: RequestEnvelope<WorkerRequest> = serde_json::from_str(
            r#"{"id":1,"message":{"type":"findStopBySourceId","stopId":"X"}}"#,
        )
        .unwrap();

        let reply = block_on(service.respond(envelope));
        assert_eq!(reply.id, 1);
        assert_eq!(reply.outcome, Outcome::Error("unsupported request type".into()));
        assert_eq!(source.loads.get(), 0);
    }
}
