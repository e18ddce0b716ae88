//! UI-side façade: typed planner calls over an [`AsyncChannel`].

use crate::channel::{self, AsyncChannel};
use crate::codec::PlainValueCodec;
use crate::error::PlannerError;
use crate::protocol::{Arrival, Route, SimpleStop, SourceStopId, Time, WorkerReply, WorkerRequest};
use crate::worker_agent::PlannerTask;
use futures::{Future, StreamExt};
use log::info;
use yew_agent::Spawnable;

#[derive(Clone)]
pub struct PlannerClient {
    channel: AsyncChannel<WorkerRequest, WorkerReply>,
}

macro_rules! expect_reply {
    ($call:expr, $expected:literal, $pattern:pat => $value:expr) => {{
        let reply = $call;
        async move {
            match reply.await? {
                $pattern => Ok($value),
                _ => Err(PlannerError::UnexpectedReply {
                    expected: $expected,
                }),
            }
        }
    }};
}

impl PlannerClient {
    pub fn new(channel: AsyncChannel<WorkerRequest, WorkerReply>) -> Self {
        PlannerClient { channel }
    }

    /// Start the planner worker from `script` and drive its bridge on the
    /// local executor.
    pub fn spawn(script: &str) -> Self {
        info!("Spawning planner worker from {}", script);
        let bridge = PlannerTask::spawner()
            .encoding::<PlainValueCodec>()
            .spawn(script);
        let (sink, stream) = bridge.split();
        let (channel, driver) = channel::channel();
        wasm_bindgen_futures::spawn_local(driver.run(sink, stream));
        PlannerClient::new(channel)
    }

    pub fn route(
        &self,
        origin: SourceStopId,
        destination: SourceStopId,
        departure_time: Time,
        max_transfers: u8,
    ) -> impl Future<Output = Result<Option<Route>, PlannerError>> + 'static {
        expect_reply!(
            self.channel.call(WorkerRequest::Routing {
                origin,
                destination,
                departure_time: departure_time.to_seconds(),
                max_transfers,
            }),
            "route",
            WorkerReply::Route { route } => route
        )
    }

    pub fn arrivals(
        &self,
        origin: SourceStopId,
        departure_time: Time,
        max_transfers: u8,
        max_duration_secs: u32,
    ) -> impl Future<Output = Result<Vec<Arrival>, PlannerError>> + 'static {
        expect_reply!(
            self.channel.call(WorkerRequest::ArrivalsResolution {
                origin,
                departure_time: departure_time.to_seconds(),
                max_transfers,
                max_duration: max_duration_secs,
            }),
            "arrivals",
            WorkerReply::Arrivals { arrivals } => arrivals
        )
    }

    pub fn find_stops_by_name(
        &self,
        query: String,
        max_results: Option<usize>,
    ) -> impl Future<Output = Result<Vec<SimpleStop>, PlannerError>> + 'static {
        expect_reply!(
            self.channel.call(WorkerRequest::FindStopsByName { query, max_results }),
            "stops",
            WorkerReply::Stops { stops } => stops
        )
    }

    pub fn find_stop_by_id(
        &self,
        stop_id: SourceStopId,
    ) -> impl Future<Output = Result<Option<SimpleStop>, PlannerError>> + 'static {
        expect_reply!(
            self.channel.call(WorkerRequest::FindStopById { stop_id }),
            "stop",
            WorkerReply::Stop { stop } => stop
        )
    }

    pub fn find_stops_by_location(
        &self,
        lat: f64,
        lon: f64,
        max_results: usize,
        radius_km: f64,
    ) -> impl Future<Output = Result<Vec<SimpleStop>, PlannerError>> + 'static {
        expect_reply!(
            self.channel.call(WorkerRequest::FindStopsByLocation {
                lat,
                lon,
                max_results,
                radius: radius_km,
            }),
            "stops",
            WorkerReply::Stops { stops } => stops
        )
    }

    /// Ask the worker to shed half of its query cache.
    pub fn release_memory(&self) -> impl Future<Output = Result<usize, PlannerError>> + 'static {
        expect_reply!(
            self.channel.call(WorkerRequest::ReleaseMemory),
            "memoryReleased",
            WorkerReply::MemoryReleased { evicted } => evicted
        )
    }

    pub fn pending(&self) -> usize {
        self.channel.pending()
    }
}
