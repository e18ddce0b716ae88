//! Call contract of the routing engine hosted by the worker.
//!
//! The worker only ever talks to the engine through [`TransitEngine`]; the
//! bundled [`network::Network`] is one implementation of it.

use crate::error::PlannerError;
use crate::protocol::{Route, SourceStopId, Stop, StopId, Time};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

pub mod network;

/// A routing query. Destinations may be empty to explore the whole network.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub origin: SourceStopId,
    pub destinations: Vec<SourceStopId>,
    pub departure_time: Time,
    pub max_transfers: u8,
}

impl Query {
    pub fn from(origin: impl Into<SourceStopId>, departure_time: Time, max_transfers: u8) -> Self {
        Query {
            origin: origin.into(),
            destinations: Vec::new(),
            departure_time,
            max_transfers,
        }
    }

    pub fn to(mut self, destination: impl Into<SourceStopId>) -> Self {
        self.destinations.push(destination.into());
        self
    }
}

/// Earliest time a stop is reached and on which leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachingTime {
    pub time: Time,
    /// 0 at the origin, 1 after the first vehicle, and so on.
    pub leg_number: u8,
}

pub trait RoutingResult {
    fn earliest_arrivals(&self) -> Vec<(StopId, ReachingTime)>;

    fn best_route(&self, destination: &str) -> Option<Route>;
}

pub trait TransitEngine {
    fn route(&self, query: &Query) -> Result<Rc<dyn RoutingResult>, PlannerError>;

    fn find_stop_by_id(&self, id: StopId) -> Option<Stop>;

    fn find_stop_by_source_id(&self, id: &str) -> Option<Stop>;

    fn find_stops_by_name(&self, query: &str, max_results: usize) -> Vec<Stop>;

    fn find_stops_by_location(
        &self,
        lat: f64,
        lon: f64,
        max_results: usize,
        radius_km: f64,
    ) -> Vec<Stop>;
}

/// Produces a ready engine; the expensive step the worker runs once.
pub trait EngineSource {
    fn load(&self) -> LocalBoxFuture<'static, Result<Rc<dyn TransitEngine>, PlannerError>>;
}
