//! Wire types exchanged between the UI thread and the planner worker.
//!
//! Only plain values cross the boundary. Times travel as seconds since
//! midnight (`{"secondsSinceMidnight": n}`) and durations as total seconds
//! (`{"totalSeconds": n}`); the field names are part of the contract.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stop as published in the source timetable.
pub type SourceStopId = String;

/// Dense internal stop index used by the engine.
pub type StopId = u32;

/// Correlation id attached to every request crossing the boundary.
pub type MessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Time {
    seconds_since_midnight: u32,
}

impl Time {
    pub const fn from_seconds(seconds: u32) -> Self {
        Time {
            seconds_since_midnight: seconds,
        }
    }

    pub const fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Time::from_seconds(hours * 3600 + minutes * 60 + seconds)
    }

    pub fn to_seconds(self) -> u32 {
        self.seconds_since_midnight
    }

    /// Time elapsed since `earlier`, zero if `earlier` is later.
    pub fn since(self, earlier: Time) -> Duration {
        Duration::from_seconds(
            self.seconds_since_midnight
                .saturating_sub(earlier.seconds_since_midnight),
        )
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds_since_midnight;
        write!(f, "{:02}:{:02}", s / 3600, (s % 3600) / 60)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Duration {
    total_seconds: u32,
}

impl Duration {
    pub const fn from_seconds(seconds: u32) -> Self {
        Duration {
            total_seconds: seconds,
        }
    }

    pub fn to_seconds(self) -> u32 {
        self.total_seconds
    }
}

/// A stop as the engine knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: StopId,
    pub source_stop_id: SourceStopId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

/// Stop shape returned by lookups. Always has coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleStop {
    pub source_id: SourceStopId,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl SimpleStop {
    /// `None` when the stop has no coordinates.
    pub fn from_stop(stop: &Stop) -> Option<Self> {
        Some(SimpleStop {
            source_id: stop.source_stop_id.clone(),
            name: stop.name.clone(),
            lat: stop.lat?,
            lon: stop.lon?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableTram,
    AerialLift,
    Funicular,
    Trolleybus,
    Monorail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRoute {
    #[serde(rename = "type")]
    pub route_type: RouteType,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    Recommended,
    Guaranteed,
    RequiresMinimalTime,
    InSeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLeg {
    pub from: Stop,
    pub to: Stop,
    pub route: ServiceRoute,
    pub departure_time: Time,
    pub arrival_time: Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub from: Stop,
    pub to: Stop,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_transfer_time: Option<Duration>,
    #[serde(rename = "type")]
    pub transfer_type: TransferType,
}

/// Vehicle legs carry a `route`; transfers carry a `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Leg {
    Vehicle(VehicleLeg),
    Transfer(Transfer),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Route {
    pub legs: Vec<Leg>,
}

impl Route {
    fn vehicle_legs(&self) -> impl Iterator<Item = &VehicleLeg> {
        self.legs.iter().filter_map(|leg| match leg {
            Leg::Vehicle(v) => Some(v),
            Leg::Transfer(_) => None,
        })
    }

    pub fn departure_time(&self) -> Option<Time> {
        self.vehicle_legs().next().map(|leg| leg.departure_time)
    }

    pub fn arrival_time(&self) -> Option<Time> {
        self.vehicle_legs().last().map(|leg| leg.arrival_time)
    }

    /// Number of vehicle changes along the route.
    pub fn transfers(&self) -> usize {
        self.vehicle_legs().count().saturating_sub(1)
    }
}

/// One reachable stop of an arrivals resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    /// `[lon, lat]`
    pub position: [f64; 2],
    /// Seconds from departure.
    pub duration: u32,
    pub transfers: u8,
}

/// Requests understood by the worker, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerRequest {
    ArrivalsResolution {
        origin: SourceStopId,
        /// Seconds since midnight.
        departure_time: u32,
        max_transfers: u8,
        /// Seconds.
        max_duration: u32,
    },
    Routing {
        origin: SourceStopId,
        destination: SourceStopId,
        departure_time: u32,
        max_transfers: u8,
    },
    FindStopsByName {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_results: Option<usize>,
    },
    FindStopById {
        stop_id: SourceStopId,
    },
    FindStopsByLocation {
        lat: f64,
        lon: f64,
        max_results: usize,
        /// Kilometres.
        radius: f64,
    },
    /// Shed the least-recently-used half of the worker's query cache.
    ReleaseMemory,
    /// Any `type` this worker does not know. Answered with an error so the
    /// caller's pending request still settles.
    #[serde(other)]
    Unknown,
}

impl WorkerRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerRequest::ArrivalsResolution { .. } => "arrivalsResolution",
            WorkerRequest::Routing { .. } => "routing",
            WorkerRequest::FindStopsByName { .. } => "findStopsByName",
            WorkerRequest::FindStopById { .. } => "findStopById",
            WorkerRequest::FindStopsByLocation { .. } => "findStopsByLocation",
            WorkerRequest::ReleaseMemory => "releaseMemory",
            WorkerRequest::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerReply {
    Arrivals { arrivals: Vec<Arrival> },
    Route { route: Option<Route> },
    Stops { stops: Vec<SimpleStop> },
    Stop { stop: Option<SimpleStop> },
    MemoryReleased { evicted: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope<M> {
    pub id: MessageId,
    pub message: M,
}

/// Either the handler's result or the text of its error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome<R> {
    Reply(R),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope<R> {
    pub id: MessageId,
    pub outcome: Outcome<R>,
}
